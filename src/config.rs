//! Configuration for the completion provider and failover behavior

use serde::{Deserialize, Serialize};
use log::{debug, warn};
use std::fmt;
use std::path::Path;

/// Environment variable holding the OpenRouter bearer token
pub const CREDENTIAL_ENV: &str = "OPENROUTER_API_KEY";
/// Environment variable overriding the default model
pub const MODEL_ENV: &str = "SUTRADHAR_MODEL";
/// Environment variable selecting `openrouter` or `mock`
pub const STRATEGY_ENV: &str = "SUTRADHAR_STRATEGY";

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemma-3-27b-it:free";
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Upper bounds accepted from settings
pub const MAX_RETRIES_LIMIT: usize = 10;
pub const MAX_DELAY_SECS: u64 = 300;
pub const MAX_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_FALLBACK_MODELS: [&str; 3] =
[   "mistralai/mistral-7b-instruct:free"
  , "meta-llama/llama-3.2-3b-instruct:free"
  , "openrouter/auto"
];

/// Bearer token. Redacted in every textual representation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential
{   pub fn new(token: impl Into<String>) -> Self
    {   Credential(token.into())
    }

    /// Raw token, for the Authorization header only
    pub fn expose(&self) -> &str
    {   &self.0
    }

    fn is_blank(&self) -> bool
    {   self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str("***")
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig
{   /// API base URL
    pub api_base: String
  , /// Per-attempt request timeout in seconds
    pub timeout_secs: u64
  , /// Model used when the caller does not name one
    pub default_model: String
  , /// Bearer token, if configured
    pub credential: Option<Credential>
}

impl Default for ProviderConfig
{   fn default() -> Self
    {   ProviderConfig
        {   api_base: DEFAULT_API_BASE.to_string()
          , timeout_secs: DEFAULT_TIMEOUT_SECS
          , default_model: DEFAULT_MODEL.to_string()
          , credential: None
        }
    }
}

/// Failover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig
{   /// Retries per model after the first attempt
    pub max_retries: usize
  , /// Linear rate-limit backoff step in seconds
    pub rate_limit_backoff_secs: u64
  , /// Pause after any other failed attempt, in seconds
    pub retry_delay_secs: u64
  , /// Models tried in order once the primary is exhausted
    pub fallback_models: Vec<String>
}

impl Default for FailoverConfig
{   fn default() -> Self
    {   FailoverConfig
        {   max_retries: 2
          , rate_limit_backoff_secs: 2
          , retry_delay_secs: 1
          , fallback_models: DEFAULT_FALLBACK_MODELS
              .iter()
              .map(|m| m.to_string())
              .collect()
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig
{   /// Which provider variant to build
    pub strategy: crate::ProviderKind
  , /// Provider configuration
    pub provider: ProviderConfig
  , /// Failover configuration
    pub failover: FailoverConfig
}

impl GeneratorConfig
{   /// Read settings from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>)
      -> crate::Result<Self>
    {   let path = path.as_ref();
        debug!("Loading settings from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let config: GeneratorConfig = serde_json::from_str(&raw)
          .map_err(|e| {
            crate::Error::Configuration(
              format!("{}: {}", path.display(), e)
            )
          })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject retry and timeout values that would stall or
    /// overflow the failover loop
    pub fn validate(&self) -> crate::Result<()>
    {   let failover = &self.failover;
        let checks =
        [   ( failover.max_retries <= MAX_RETRIES_LIMIT
            , format!("failover.max_retries must be at most {}", MAX_RETRIES_LIMIT)
            )
          , ( failover.rate_limit_backoff_secs <= MAX_DELAY_SECS
            , format!(
                "failover.rate_limit_backoff_secs must be at most {}",
                MAX_DELAY_SECS
              )
            )
          , ( failover.retry_delay_secs <= MAX_DELAY_SECS
            , format!(
                "failover.retry_delay_secs must be at most {}",
                MAX_DELAY_SECS
              )
            )
          , ( (1..=MAX_TIMEOUT_SECS).contains(&self.provider.timeout_secs)
            , format!(
                "provider.timeout_secs must be between 1 and {}",
                MAX_TIMEOUT_SECS
              )
            )
        ];
        match checks.into_iter().find(|(ok, _)| !ok)
        {   Some((_, message)) => {
              warn!("Rejected settings: {}", message);
              Err(crate::Error::Configuration(message))
            }
          , None => Ok(())
        }
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> crate::Result<Self>
    {   Self::load(None::<&Path>)
    }

    /// Settings file (if any) overlaid with the process environment.
    ///
    /// Loads `.env` first. An environment credential wins over
    /// one in the file.
    pub fn load(path: Option<impl AsRef<Path>>)
      -> crate::Result<Self>
    {   if let Err(e) = dotenvy::dotenv()
        {   debug!("No .env loaded: {}", e);
        }
        let mut config = match path
        {   Some(p) => Self::from_json_file(p)?
          , None => GeneratorConfig::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::Result<()>
    where
      F: Fn(&str) -> Option<String>
    {   if let Some(token) = lookup(CREDENTIAL_ENV)
          .filter(|t| !t.trim().is_empty())
        {   debug!("Credential taken from {}", CREDENTIAL_ENV);
            self.provider.credential = Some(Credential::new(token));
        }
        if let Some(model) = lookup(MODEL_ENV)
          .filter(|m| !m.trim().is_empty())
        {   debug!("Default model overridden: {}", model);
            self.provider.default_model = model;
        }
        if let Some(raw) = lookup(STRATEGY_ENV)
        {   self.strategy = raw.parse()?;
        }
        Ok(())
    }
}

/// Resolve the bearer token for one client.
///
/// An explicit per-call credential wins, then the configured one.
/// Blank values count as absent.
pub fn resolve_credential(
  explicit: Option<Credential>
, config: &GeneratorConfig
) -> crate::Result<Credential>
{   explicit
      .filter(|c| !c.is_blank())
      .or_else(|| {
        config.provider.credential.clone()
          .filter(|c| !c.is_blank())
      })
      .ok_or_else(|| {
        warn!("No credential configured");
        crate::Error::Configuration(format!(
          "{} is not set in environment or config",
          CREDENTIAL_ENV
        ))
      })
}
