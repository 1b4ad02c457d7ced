use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, trace, error, info, warn};

use crate::config::{Credential, GeneratorConfig};
use crate::failover::{AttemptOutcome, FailoverSequence, RetryPolicy};
use crate::request::{CompletionRequest, ModelsResponse};

// ===== Transport =====

/// Status and body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply
{   pub status: u16
  , pub body: String
}

impl HttpReply
{   pub fn new(status: u16, body: impl Into<String>) -> Self
    {   HttpReply
        {   status
          , body: body.into()
        }
    }
}

/// Raw HTTP access to the chat-completions API.
///
/// `Err` means the exchange itself failed (connect, timeout,
/// body read). Non-200 statuses come back as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync
{   async fn post_chat(
      &self
    , request: &CompletionRequest
    ) -> crate::Result<HttpReply>;

    async fn get_models(
      &self
    , credential: &Credential
    , timeout: Duration
    ) -> crate::Result<HttpReply>;
}

/// reqwest-backed transport
pub struct HttpTransport
{   api_base: String
  , http_client: reqwest::Client
}

impl HttpTransport
{   pub fn new(api_base: impl Into<String>) -> Self
    {   let api_base = api_base.into();
        debug!("Creating HttpTransport for {}", api_base);
        HttpTransport
        {   api_base: api_base.trim_end_matches('/').to_string()
          , http_client: reqwest::Client::new()
        }
    }
}

#[async_trait]
impl Transport for HttpTransport
{   async fn post_chat(
      &self
    , request: &CompletionRequest
    ) -> crate::Result<HttpReply>
    {   let body = request.body();
        trace!("Chat request for model: {}", body.model);

        let response = self.http_client
          .post(format!("{}/chat/completions", self.api_base))
          .bearer_auth(request.credential.expose())
          .header("Content-Type", "application/json")
          .timeout(request.timeout)
          .json(&body)
          .send()
          .await?;

        let status = response.status().as_u16();
        trace!("Chat response status: {}", status);
        let text = response.text().await?;
        Ok(HttpReply::new(status, text))
    }

    async fn get_models(
      &self
    , credential: &Credential
    , timeout: Duration
    ) -> crate::Result<HttpReply>
    {   let response = self.http_client
          .get(format!("{}/models", self.api_base))
          .bearer_auth(credential.expose())
          .timeout(timeout)
          .send()
          .await?;

        let status = response.status().as_u16();
        trace!("Models response status: {}", status);
        let text = response.text().await?;
        Ok(HttpReply::new(status, text))
    }
}

// ===== Model Listing =====

/// Which model ids `list_models` keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFilter
{   #[default]
    All
  , /// ids mentioning `free`, `gemini` or `mistral`
    FreeTier
}

impl ModelFilter
{   pub fn accepts(&self, id: &str) -> bool
    {   match self
        {   ModelFilter::All => true
          , ModelFilter::FreeTier => {
              ["free", "gemini", "mistral"]
                .iter()
                .any(|needle| id.contains(needle))
            }
        }
    }
}

// ===== OpenRouter Client =====

/// Network-backed provider with retry and model fallback
pub struct OpenRouterClient
{   model: String
  , credential: Credential
  , timeout: Duration
  , policy: RetryPolicy
  , fallback_models: Vec<String>
  , transport: Arc<dyn Transport>
}

impl OpenRouterClient
{   /// Create a client for `model`.
    ///
    /// Fails with `Error::Configuration` when no credential can
    /// be resolved or the settings are out of range. No request
    /// is made here.
    pub fn new(
      model: impl Into<String>
    , config: &GeneratorConfig
    , explicit_credential: Option<Credential>
    ) -> crate::Result<Self>
    {   let model = model.into();
        debug!("Creating OpenRouterClient for {}", model);
        config.validate()?;
        let credential = crate::config::resolve_credential(
          explicit_credential
        , config
        )?;
        Ok(OpenRouterClient
        {   model
          , credential
          , timeout: Duration::from_secs(config.provider.timeout_secs)
          , policy: RetryPolicy::from(&config.failover)
          , fallback_models: config.failover.fallback_models.clone()
          , transport: Arc::new(
              HttpTransport::new(config.provider.api_base.clone())
            )
        })
    }

    /// Swap the HTTP layer
    pub fn with_transport(mut self, transport: Arc<dyn Transport>)
      -> Self
    {   self.transport = transport;
        self
    }

    /// Ids of the models the API offers
    pub async fn list_models(
      &self
    , filter: ModelFilter
    ) -> crate::Result<Vec<String>>
    {   debug!("Handling list_models");
        let reply = self.transport
          .get_models(&self.credential, self.timeout)
          .await?;

        if reply.status != 200
        {   error!("Failed to get models: {}", reply.status);
            return Err(crate::Error::Api
            {   status: reply.status
              , body: reply.body
            });
        }

        let models: ModelsResponse = serde_json::from_str(&reply.body)?;
        let ids: Vec<String> = models.data
          .into_iter()
          .map(|m| m.id)
          .filter(|id| filter.accepts(id))
          .collect();

        debug!("Retrieved {} models", ids.len());
        Ok(ids)
    }

    /// Run the retry sub-procedure against one model.
    /// `None` means the model is exhausted.
    async fn try_model(
      &self
    , model: &str
    , prompt: &str
    ) -> Option<String>
    {   let request = CompletionRequest::new(
          model
        , prompt
        , self.credential.clone()
        , self.timeout
        );

        for attempt in 0..self.policy.attempts()
        {   let outcome = match self.transport
              .post_chat(&request)
              .await
            {   Ok(reply) => {
                  AttemptOutcome::classify(reply.status, &reply.body)
                }
              , Err(e) => AttemptOutcome::Transient(e.to_string())
            };

            match outcome
            {   AttemptOutcome::Success(content) => {
                  debug!(
                    "{} answered on attempt {}",
                    model,
                    attempt + 1
                  );
                  return Some(content);
                }
              , AttemptOutcome::Empty => {
                  warn!("Empty completion from {}", model);
                  return None;
                }
              , AttemptOutcome::RateLimited => {
                  if !self.policy.has_retry_after(attempt)
                  {   warn!("Rate limit exhausted for {}.", model);
                      return None;
                  }
                  let wait = self.policy.rate_limit_backoff(attempt);
                  warn!(
                    "Rate limit ({}). Retrying in {}s...",
                    model,
                    wait.as_secs()
                  );
                  tokio::time::sleep(wait).await;
                }
              , AttemptOutcome::Transient(reason) => {
                  warn!("Error for {}: {}", model, reason);
                  if !self.policy.has_retry_after(attempt)
                  {   return None;
                  }
                  tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
        None
    }
}

#[async_trait]
impl super::CompletionProvider for OpenRouterClient
{   async fn generate(&self, prompt: &str) -> crate::Result<String>
    {   let sequence = FailoverSequence::new(
          &self.model
        , &self.fallback_models
        );

        for (index, model) in sequence.iter().enumerate()
        {   if index == 0
            {   info!("Generating with primary model: {}", model);
            } else
            {   info!("Primary failed. Switching to fallback: {}", model);
            }

            if let Some(content) = self.try_model(model, prompt).await
            {   return Ok(content);
            }
        }

        error!("All {} models failed", sequence.models.len());
        Err(crate::Error::AllModelsFailed
        {   models: sequence.models
        })
    }

    fn name(&self) -> &str
    {   "openrouter"
    }
}
