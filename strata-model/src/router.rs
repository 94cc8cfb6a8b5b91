//! Family-dispatching provider composition.
//!
//! A [`ProviderRouter`] wraps up to one provider per family and
//! implements [`Provider`] itself, dispatching each request by its
//! resolved model identifier. Tier executors stay generic over a single
//! `P: Provider` and don't know how many backends sit behind it.

use crate::catalog::{resolve_model, ModelFamily};
use crate::provider::{Provider, ProviderError};
use crate::types::{ProviderRequest, ProviderResponse};

/// Routes requests to the Claude or GPT provider by model family.
pub struct ProviderRouter<C, G> {
    claude: Option<C>,
    gpt: Option<G>,
}

impl<C: Provider, G: Provider> ProviderRouter<C, G> {
    /// A router with no providers; every call fails until one is bound.
    pub fn new() -> Self {
        Self {
            claude: None,
            gpt: None,
        }
    }

    /// Bind the Claude-family provider.
    pub fn with_claude(mut self, provider: C) -> Self {
        self.claude = Some(provider);
        self
    }

    /// Bind the GPT-family provider.
    pub fn with_gpt(mut self, provider: G) -> Self {
        self.gpt = Some(provider);
        self
    }
}

impl<C: Provider, G: Provider> Default for ProviderRouter<C, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Provider, G: Provider> Provider for ProviderRouter<C, G> {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        async move {
            let resolved = resolve_model(request.model.as_deref(), false)?;
            match resolved.family {
                ModelFamily::Claude => match &self.claude {
                    Some(provider) => provider.complete(request).await,
                    None => Err(ProviderError::UnsupportedModel(format!(
                        "{}: no Claude provider configured",
                        resolved.id
                    ))),
                },
                ModelFamily::Gpt => match &self.gpt {
                    Some(provider) => provider.complete(request).await,
                    None => Err(ProviderError::UnsupportedModel(format!(
                        "{}: no GPT provider configured",
                        resolved.id
                    ))),
                },
                _ => Err(ProviderError::UnsupportedModel(resolved.id)),
            }
        }
    }
}
