//! Language-dispatched compilation with a content-addressed artifact
//! cache in front.

use crate::typescript::strip_types;
use std::sync::Arc;
use std::time::Instant;
use strata_cache::{ArtifactCache, CachedArtifact};
use tier0::{Artifact, EngineError, ErrorKind, Language};
use tracing::debug;

/// The result of compiling (or cache-loading) one source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    /// The executable artifact.
    pub artifact: Artifact,
    /// Time spent compiling; 0 on a cache hit.
    pub compilation_time_ms: u64,
    /// Whether the artifact came from cache.
    pub cache_hit: bool,
    /// Content digest of the source text.
    pub hash: String,
}

/// Compiles source text into an executable artifact, consulting the
/// artifact cache when one is attached.
#[derive(Default)]
pub struct Compiler {
    cache: Option<Arc<ArtifactCache>>,
}

impl Compiler {
    /// A compiler with no cache: every call compiles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a content-addressed artifact cache.
    pub fn with_cache(mut self, cache: Arc<ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Compile `source` for `language`.
    ///
    /// Compilation failures are reported as `CompilationError` (or
    /// `SyntaxError` where the input cannot be parsed at all); callers
    /// convert them into failed results rather than propagating.
    pub async fn compile(
        &self,
        language: Language,
        source: &str,
    ) -> Result<CompileOutput, EngineError> {
        let hash = ArtifactCache::digest(source);

        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.get(&hash).await {
                return Ok(CompileOutput {
                    artifact: Artifact::from_wire(&entry.compiled_code),
                    compilation_time_ms: 0,
                    cache_hit: true,
                    hash,
                });
            }
        }

        let start = Instant::now();
        let artifact = self.transform(language, source)?;
        let compilation_time_ms = start.elapsed().as_millis() as u64;
        debug!(language = %language, compilation_time_ms, "compiled source");

        if let Some(cache) = &self.cache {
            cache
                .put(&CachedArtifact {
                    compiled_code: artifact.to_wire(),
                    language,
                    compilation_time_ms,
                    hash: hash.clone(),
                    cached_at: chrono_now_millis(),
                })
                .await;
        }

        Ok(CompileOutput {
            artifact,
            compilation_time_ms,
            cache_hit: false,
            hash,
        })
    }

    fn transform(&self, language: Language, source: &str) -> Result<Artifact, EngineError> {
        match language {
            Language::Javascript => Ok(Artifact::Js(source.to_string())),
            Language::Typescript => strip_types(source).map(Artifact::Js),
            Language::Python => Ok(Artifact::Python(source.to_string())),
            lang if lang.is_wasm_family() => {
                let artifact = Artifact::from_wire(source);
                if artifact.is_wasm() {
                    Ok(artifact)
                } else {
                    Err(EngineError::new(
                        ErrorKind::CompilationError,
                        format!(
                            "{lang} requires a pre-compiled WASM binary; \
                             ahead-of-time toolchains are not wired in"
                        ),
                    ))
                }
            }
            other => Err(EngineError::invalid_input(format!(
                "unsupported language: {other}"
            ))),
        }
    }
}

fn chrono_now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
