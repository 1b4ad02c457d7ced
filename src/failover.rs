//! Failover and retry logic for model fallbacks

use std::time::Duration;
use log::{debug, trace};
use crate::config::FailoverConfig;
use crate::request::ChatResponse;

/// Retry policy for a single model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy
{   pub max_retries: usize
  , pub rate_limit_step: Duration
  , pub retry_delay: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_retries: usize
    , rate_limit_step: Duration
    , retry_delay: Duration
    ) -> Self
    {   RetryPolicy
        {   max_retries
          , rate_limit_step
          , retry_delay
        }
    }

    /// Total attempts per model
    pub fn attempts(&self) -> usize
    {   self.max_retries.saturating_add(1)
    }

    /// Linear wait after a 429 on attempt `attempt` (0-based)
    pub fn rate_limit_backoff(&self, attempt: usize) -> Duration
    {   debug!("Calculating backoff for attempt {}", attempt);
        let factor = u32::try_from(attempt)
          .unwrap_or(u32::MAX)
          .saturating_add(1);
        self.rate_limit_step.saturating_mul(factor)
    }

    /// Whether another attempt follows attempt `attempt`
    pub fn has_retry_after(&self, attempt: usize) -> bool
    {   attempt < self.max_retries
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::from(&FailoverConfig::default())
    }
}

impl From<&FailoverConfig> for RetryPolicy
{   fn from(config: &FailoverConfig) -> Self
    {   RetryPolicy::new(
          config.max_retries
        , Duration::from_secs(config.rate_limit_backoff_secs)
        , Duration::from_secs(config.retry_delay_secs)
        )
    }
}

/// What one HTTP attempt amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome
{   /// Usable completion text
    Success(String)
  , /// HTTP 429
    RateLimited
  , /// Other status, transport or body failure
    Transient(String)
  , /// 200 with empty content; the model is abandoned without retry
    Empty
}

impl AttemptOutcome
{   /// Map an HTTP reply to an outcome
    pub fn classify(status: u16, body: &str) -> Self
    {   trace!("Classifying status {}", status);
        match status
        {   429 => AttemptOutcome::RateLimited
          , 200 => {
              match serde_json::from_str::<ChatResponse>(body)
                .map_err(crate::Error::from)
                .and_then(ChatResponse::first_content)
              {   Ok(content) if content.is_empty() => {
                    AttemptOutcome::Empty
                  }
                , Ok(content) => AttemptOutcome::Success(content)
                , Err(e) => AttemptOutcome::Transient(e.to_string())
              }
            }
          , _ => AttemptOutcome::Transient(
              crate::Error::Api
              {   status
                , body: body.to_string()
              }.to_string()
            )
        }
    }
}

/// Ordered models for one `generate` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverSequence
{   pub models: Vec<String>
}

impl FailoverSequence
{   /// Primary first, then fallbacks in order minus the primary
    pub fn new(primary: &str, fallbacks: &[String]) -> Self
    {   let mut models = vec![primary.to_string()];
        models.extend(
          fallbacks.iter()
            .filter(|m| m.as_str() != primary)
            .cloned()
        );
        debug!(
          "Creating failover sequence with {} models",
          models.len()
        );
        FailoverSequence { models }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str>
    {   self.models.iter().map(String::as_str)
    }
}
