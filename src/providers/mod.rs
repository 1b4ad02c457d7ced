//! Completion providers

pub mod openrouter;
pub mod stub;

use std::sync::Arc;
use async_trait::async_trait;
use log::debug;

// Re-export for convenience
pub use openrouter::{HttpReply, HttpTransport, ModelFilter, OpenRouterClient, Transport};
pub use stub::StubClient;

/// The single capability every provider offers
#[async_trait]
pub trait CompletionProvider: Send + Sync
{   /// Obtain one completion for `prompt`.
    ///
    /// Fails only with `Error::AllModelsFailed`.
    async fn generate(&self, prompt: &str) -> crate::Result<String>;

    /// Short label for logs
    fn name(&self) -> &str;
}

/// Build the provider variant named by `kind`.
///
/// `model` falls back to the configured default. The credential
/// is resolved here so a missing one fails before any request.
pub fn build_provider(
  kind: crate::ProviderKind
, model: Option<&str>
, config: &crate::config::GeneratorConfig
, explicit_credential: Option<crate::config::Credential>
) -> crate::Result<Arc<dyn CompletionProvider>>
{   debug!("Building provider: {:?}", kind);
    match kind
    {   crate::ProviderKind::OpenRouter => {
          let model = model
            .unwrap_or(&config.provider.default_model);
          let client = OpenRouterClient::new(
            model
          , config
          , explicit_credential
          )?;
          Ok(Arc::new(client))
        }
      , crate::ProviderKind::Mock => Ok(Arc::new(StubClient::new()))
    }
}
