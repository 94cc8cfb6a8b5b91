//! Source resolution — from a [`CodeSource`] descriptor to text or a
//! binary-modality sentinel.
//!
//! The loader never fetches WASM bytes itself; binary modalities return
//! sentinel artifacts that the sandbox router resolves at execution
//! time. Collaborator bindings are optional at construction; a source
//! form whose binding is absent fails with `ConfigurationError`.

use serde_json::Value;
use std::sync::Arc;
use tier0::{Artifact, CodeSource, EngineError, ErrorKind, KvStore, ObjectStore};
use tracing::debug;

/// Resolves code sources against the configured collaborators.
#[derive(Default, Clone)]
pub struct SourceLoader {
    registry: Option<Arc<dyn KvStore>>,
    kv: Option<Arc<dyn KvStore>>,
    assets: Option<Arc<dyn ObjectStore>>,
    http: Option<reqwest::Client>,
}

impl SourceLoader {
    /// A loader with no collaborator bindings. Inline sources and
    /// inline WASM still resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the function registry (JSON `{code}` documents).
    pub fn with_registry(mut self, registry: Arc<dyn KvStore>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Bind the KV namespace used by `kv` and `wasm` sources.
    pub fn with_kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Bind the assets store used by `assets` sources.
    pub fn with_assets(mut self, assets: Arc<dyn ObjectStore>) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Enable `url` sources with the given HTTP client.
    pub fn with_http(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Resolve a source to its artifact wire form: raw text for text
    /// modalities, a sentinel for binary ones.
    pub async fn load(&self, source: &CodeSource) -> Result<String, EngineError> {
        match source {
            CodeSource::Inline { code } => Ok(code.clone()),

            CodeSource::Kv { bucket, key } => {
                let kv = self.kv.as_ref().ok_or_else(|| {
                    EngineError::configuration("kv source requires a KV binding")
                })?;
                let full_key = format!("{bucket}:{key}");
                match kv.get(&full_key).await? {
                    Some(bytes) => String::from_utf8(bytes).map_err(|_| {
                        EngineError::new(
                            ErrorKind::SourceUnavailable,
                            format!("kv source {full_key} is not valid UTF-8"),
                        )
                    }),
                    None => Err(EngineError::new(
                        ErrorKind::SourceNotFound,
                        format!("kv source not found: {full_key}"),
                    )),
                }
            }

            CodeSource::Url { url } => {
                let http = self.http.as_ref().ok_or_else(|| {
                    EngineError::configuration("url source requires an HTTP client")
                })?;
                debug!(url, "fetching source");
                let response = http.get(url).send().await.map_err(|e| {
                    EngineError::new(
                        ErrorKind::SourceUnavailable,
                        format!("fetch failed for {url}: {e}"),
                    )
                })?;
                if !response.status().is_success() {
                    return Err(EngineError::new(
                        ErrorKind::SourceUnavailable,
                        format!("fetch failed for {url}: HTTP {}", response.status()),
                    ));
                }
                response.text().await.map_err(|e| {
                    EngineError::new(
                        ErrorKind::SourceUnavailable,
                        format!("fetch body failed for {url}: {e}"),
                    )
                })
            }

            CodeSource::Registry {
                function_id,
                version,
            } => {
                let registry = self.registry.as_ref().ok_or_else(|| {
                    EngineError::configuration("registry source requires a registry binding")
                })?;
                let key = match version {
                    Some(v) => format!("{function_id}:{v}"),
                    None => function_id.to_string(),
                };
                let bytes = registry.get(&key).await?.ok_or_else(|| {
                    EngineError::new(
                        ErrorKind::SourceNotFound,
                        format!("registry entry not found: {key}"),
                    )
                })?;
                let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
                    EngineError::new(
                        ErrorKind::SourceUnavailable,
                        format!("registry entry {key} is not valid JSON: {e}"),
                    )
                })?;
                document
                    .get("code")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        EngineError::new(
                            ErrorKind::SourceUnavailable,
                            format!("registry entry {key} has no code field"),
                        )
                    })
            }

            CodeSource::Assets {
                function_id,
                version,
            } => {
                if self.assets.is_none() {
                    return Err(EngineError::configuration(
                        "assets source requires an assets binding",
                    ));
                }
                Ok(Artifact::WasmAssets {
                    function_id: function_id.to_string(),
                    version: version.clone().unwrap_or_else(|| "latest".into()),
                }
                .to_wire())
            }

            CodeSource::Wasm {
                function_id,
                version,
            } => {
                if self.kv.is_none() {
                    return Err(EngineError::configuration(
                        "wasm source requires a KV binding",
                    ));
                }
                Ok(Artifact::WasmKv {
                    function_id: function_id.to_string(),
                    version: version.clone().unwrap_or_else(|| "latest".into()),
                }
                .to_wire())
            }

            CodeSource::InlineWasm { base64 } => Ok(Artifact::WasmInline {
                base64: base64.clone(),
            }
            .to_wire()),

            other => Err(EngineError::invalid_input(format!(
                "unknown source type: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tier0::test_utils::{InMemoryKvStore, InMemoryObjectStore};
    use tier0::FunctionId;

    #[tokio::test]
    async fn inline_returns_literal_text() {
        let loader = SourceLoader::new();
        let out = loader
            .load(&CodeSource::Inline {
                code: "export default () => 1".into(),
            })
            .await
            .unwrap();
        assert_eq!(out, "export default () => 1");
    }

    #[tokio::test]
    async fn kv_missing_binding_is_configuration_error() {
        let loader = SourceLoader::new();
        let err = loader
            .load(&CodeSource::Kv {
                bucket: "b".into(),
                key: "k".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationError);
    }

    #[tokio::test]
    async fn kv_missing_key_is_source_not_found() {
        let kv = Arc::new(InMemoryKvStore::new());
        let loader = SourceLoader::new().with_kv(kv);
        let err = loader
            .load(&CodeSource::Kv {
                bucket: "b".into(),
                key: "missing".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceNotFound);
    }

    #[tokio::test]
    async fn registry_reads_versioned_then_plain_key() {
        let registry = Arc::new(InMemoryKvStore::new());
        registry
            .insert("fn_1:2.0.0", br#"{"code":"versioned"}"#.to_vec())
            .await;
        registry
            .insert("fn_1", br#"{"code":"unversioned"}"#.to_vec())
            .await;
        let loader = SourceLoader::new().with_registry(registry);

        let versioned = loader
            .load(&CodeSource::Registry {
                function_id: FunctionId::new("fn_1"),
                version: Some("2.0.0".into()),
            })
            .await
            .unwrap();
        assert_eq!(versioned, "versioned");

        let plain = loader
            .load(&CodeSource::Registry {
                function_id: FunctionId::new("fn_1"),
                version: None,
            })
            .await
            .unwrap();
        assert_eq!(plain, "unversioned");
    }

    #[tokio::test]
    async fn wasm_modalities_return_sentinels() {
        let loader = SourceLoader::new()
            .with_kv(Arc::new(InMemoryKvStore::new()))
            .with_assets(Arc::new(InMemoryObjectStore::new()));

        let assets = loader
            .load(&CodeSource::Assets {
                function_id: FunctionId::new("fn_w"),
                version: Some("1.0.0".into()),
            })
            .await
            .unwrap();
        assert_eq!(assets, "__WASM_ASSETS__:fn_w:1.0.0");

        let kv = loader
            .load(&CodeSource::Wasm {
                function_id: FunctionId::new("fn_w"),
                version: None,
            })
            .await
            .unwrap();
        assert_eq!(kv, "__WASM_KV__:fn_w:latest");

        let inline = loader
            .load(&CodeSource::InlineWasm {
                base64: "AGFzbQ==".into(),
            })
            .await
            .unwrap();
        assert_eq!(inline, "__WASM_INLINE__:AGFzbQ==");
    }

    #[tokio::test]
    async fn url_source_fetches_over_http() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fn.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("export default () => 7"))
            .mount(&server)
            .await;

        let loader = SourceLoader::new().with_http(reqwest::Client::new());
        let out = loader
            .load(&CodeSource::Url {
                url: format!("{}/fn.js", server.uri()),
            })
            .await
            .unwrap();
        assert_eq!(out, "export default () => 7");
    }

    #[tokio::test]
    async fn url_non_2xx_is_source_unavailable() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = SourceLoader::new().with_http(reqwest::Client::new());
        let err = loader
            .load(&CodeSource::Url {
                url: format!("{}/missing.js", server.uri()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceUnavailable);
    }
}
