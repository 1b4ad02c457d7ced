use thiserror::Error as ThisError;

/// Custom error type for sutradhar operations
/// Implements Clone for sending through channels
///
/// Only `Configuration` and `AllModelsFailed` ever leave the
/// completion client. The rest describe a single attempt and
/// are absorbed by the retry/fallback loop or the extractor.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error
{   /// Credential missing or configuration unusable
    #[error("Configuration error: {0}")]
    Configuration(String)
  , /// Every model and every attempt was exhausted
    #[error(
      "All models failed ({}). Please try again later.",
      .models.join(", ")
    )]
    AllModelsFailed
    {   models: Vec<String>
    }
  , /// Transport-level failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(String)
  , /// API returned a non-success status
    #[error("API error {status}: {body}")]
    Api
    {   status: u16
      , body: String
    }
  , /// Failed to parse API response
    #[error("Parse error: {0}")]
    Parse(String)
  , /// No choices in API response
    #[error("API response contained no choices")]
    NoChoicesInResponse
  , /// Model output did not match the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String)
  , /// Settings file could not be read
    #[error("I/O error: {0}")]
    Io(String)
  , /// Backend task is gone
    #[error("Backend disconnected")]
    Disconnected
}

impl Error
{   /// Whether this error is one of the two conditions
    /// surfaced to callers of `generate`
    pub fn is_terminal(&self) -> bool
    {   matches!(
          self
        , Error::Configuration(_) | Error::AllModelsFailed { .. }
        )
    }
}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::Parse(e.to_string())
    }
}

impl From<std::io::Error> for Error
{   fn from(e: std::io::Error) -> Self
    {   Error::Io(e.to_string())
    }
}

impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   Error::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
