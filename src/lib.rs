pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod failover;
pub mod extract;
pub mod council;
pub mod story;
pub mod client;
use serde::{Deserialize, Serialize};

/*

sutradhar (the narrator): turns a world description into story
chapters and council debates by prompting an LLM over OpenRouter.

The completion client retries each model, then walks a fixed
fallback list; only "every model failed" reaches the caller.
The extractor pulls the JSON the model was asked for out of
whatever it actually wrote, and never fails.

sutradhar/
├── src/
│   ├── lib.rs          # Re-exports and backend reply types
│   ├── error.rs        # Error enum
│   ├── config.rs       # Settings, env overlay, credential
│   ├── request.rs      # Completion request and wire types
│   ├── failover.rs     # Retry policy and model ordering
│   ├── providers/      # OpenRouter client and offline stub
│   ├── extract.rs      # Fence stripping, debate/story parsing
│   ├── council.rs      # Three-persona debate
│   ├── story.rs        # Acts, story prompt, narration
│   └── client.rs       # Backend task
└── tests/

*/

pub use client::NarrativeBackend;
pub use config::{Credential, GeneratorConfig};
pub use error::{Error, Result};
pub use extract::{DebateTranscript, DebateTurn, StateUpdate, StoryTurn};
pub use providers::{build_provider, CompletionProvider};

/// SUTRADHAR BACKEND INTERFACE:

// ===== Generate =====

pub type GenerateReply = Result<String>;
pub type GenerateReplySender
  = tokio::sync::mpsc::UnboundedSender<GenerateReply>;

pub struct GenerateArgs
{   pub prompt: String
  , pub reply: GenerateReplySender
}

// ===== Debate =====

/// Debates never fail; a bad run yields the fallback transcript
pub type DebateReply = DebateTranscript;
pub type DebateReplySender
  = tokio::sync::mpsc::UnboundedSender<DebateReply>;

pub struct DebateArgs
{   pub context: String
  , pub topic: String
  , pub reply: DebateReplySender
}

// ===== Narrate =====

pub type NarrateReply = Result<StoryTurn>;
pub type NarrateReplySender
  = tokio::sync::mpsc::UnboundedSender<NarrateReply>;

pub struct NarrateArgs
{   pub request: story::StoryRequest
  , pub reply: NarrateReplySender
}

// ===== Shutdown =====

pub type ShutdownReply = Result<()>;
pub type ShutdownReplySender
  = tokio::sync::mpsc::UnboundedSender<ShutdownReply>;

pub struct ShutdownArgs
{   pub reply: ShutdownReplySender
}

/// SUTRADHAR STRUCTURES:

/// Which completion provider to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind
{   /// OpenRouter chat completions with retry and fallback
    #[default]
    OpenRouter
  , /// Fixed offline answer
    Mock
}

impl std::str::FromStr for ProviderKind
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {   match s.trim().to_ascii_lowercase().as_str()
        {   "openrouter" => Ok(ProviderKind::OpenRouter)
          , "mock" => Ok(ProviderKind::Mock)
          , other => Err(Error::Configuration(
              format!("Unknown LLM strategy: {}", other)
            ))
        }
    }
}

/// Install env_logger (RUST_LOG, default `info`). Safe to call twice.
pub fn init_logging()
{   let _ = env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
