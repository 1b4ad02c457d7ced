use std::sync::Arc;
use tokio::sync::mpsc;
use log::{debug, error, info};
use crate::providers::CompletionProvider;
use crate::story::{CharacterData, WorldConfig};

/// Commands served by the backend loop
pub enum BackendCommand
{   Generate(crate::GenerateArgs)
  , Debate(crate::DebateArgs)
  , Narrate(crate::NarrateArgs)
  , Shutdown(crate::ShutdownArgs)
}

/// Read-only state shared by every in-flight request
pub struct BackendState
{   pub provider: Arc<dyn CompletionProvider>
  , pub world: WorldConfig
  , pub characters: CharacterData
}

/// Public API for the narrative backend - owns the task
pub struct NarrativeBackend
{   tx: mpsc::UnboundedSender<BackendCommand>
  , _task_handle: tokio::task::JoinHandle<()>
}

impl NarrativeBackend
{   /// Spawn a backend over `provider` with the default world
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self
    {   Self::with_world(
          provider
        , WorldConfig::default()
        , CharacterData::default()
        )
    }

    /// Spawn a backend with explicit world data.
    /// Returns immediately - spawns background task
    pub fn with_world(
      provider: Arc<dyn CompletionProvider>
    , world: WorldConfig
    , characters: CharacterData
    ) -> Self
    {   debug!("Creating NarrativeBackend over {}", provider.name());
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(BackendState
        {   provider
          , world
          , characters
        });

        let _task_handle = tokio::spawn(async move {
          run_backend_loop(rx, state).await
        });

        NarrativeBackend
        {   tx
          , _task_handle
        }
    }

    fn queue(&self, cmd: BackendCommand) -> crate::Result<()>
    {   self.tx.send(cmd).map_err(|_| {
          error!("Backend channel closed");
          crate::Error::Disconnected
        })
    }

    /// Queue a raw completion - returns almost immediately
    pub fn generate(&self, prompt: String)
      -> crate::Result<mpsc::UnboundedReceiver<crate::GenerateReply>>
    {   debug!("generate queuing {} bytes", prompt.len());
        let (reply, reply_rx) = mpsc::unbounded_channel();
        self.queue(BackendCommand::Generate(crate::GenerateArgs
        {   prompt
          , reply
        }))?;
        Ok(reply_rx)
    }

    /// Queue a council debate - returns almost immediately
    pub fn debate(&self, context: String, topic: String)
      -> crate::Result<mpsc::UnboundedReceiver<crate::DebateReply>>
    {   debug!("debate queuing topic: {}", topic);
        let (reply, reply_rx) = mpsc::unbounded_channel();
        self.queue(BackendCommand::Debate(crate::DebateArgs
        {   context
          , topic
          , reply
        }))?;
        Ok(reply_rx)
    }

    /// Queue a story chapter - returns almost immediately
    pub fn narrate(&self, request: crate::story::StoryRequest)
      -> crate::Result<mpsc::UnboundedReceiver<crate::NarrateReply>>
    {   debug!("narrate queuing act: {}", request.act_name);
        let (reply, reply_rx) = mpsc::unbounded_channel();
        self.queue(BackendCommand::Narrate(crate::NarrateArgs
        {   request
          , reply
        }))?;
        Ok(reply_rx)
    }

    /// Gracefully shutdown the backend
    pub async fn shutdown(self) -> crate::Result<()>
    {   debug!("Shutting down NarrativeBackend");
        let (reply, mut reply_rx) = mpsc::unbounded_channel();
        self.queue(BackendCommand::Shutdown(crate::ShutdownArgs
        {   reply
        }))?;

        match reply_rx.recv().await
        {   Some(result) => {
              debug!("Backend shutdown confirmed");
              result
            }
          , None => {
              error!("Backend dropped shutdown reply");
              Err(crate::Error::Disconnected)
            }
        }
    }
}

/// Main backend event loop
///
/// The loop only routes. Each request runs on its own task so a
/// slow fallback chain never holds up the next caller.
async fn run_backend_loop(
  mut rx: mpsc::UnboundedReceiver<BackendCommand>
, state: Arc<BackendState>
)
{   debug!("Starting NarrativeBackend event loop");
    loop
    { match rx.recv().await
      {   Some(BackendCommand::Generate(cmd)) => {
            debug!("Received Generate");
            let state = Arc::clone(&state);
            tokio::spawn(async move {
              let result = state.provider.generate(&cmd.prompt).await;
              let _ = cmd.reply.send(result);
            });
          }
        , Some(BackendCommand::Debate(cmd)) => {
            debug!("Received Debate");
            let state = Arc::clone(&state);
            tokio::spawn(async move {
              let transcript = crate::council::convene(
                state.provider.as_ref()
              , &cmd.context
              , &cmd.topic
              ).await;
              let _ = cmd.reply.send(transcript);
            });
          }
        , Some(BackendCommand::Narrate(cmd)) => {
            debug!("Received Narrate");
            let state = Arc::clone(&state);
            tokio::spawn(async move {
              let result = crate::story::narrate(
                state.provider.as_ref()
              , &cmd.request
              , &state.world
              , &state.characters
              ).await;
              let _ = cmd.reply.send(result);
            });
          }
        , Some(BackendCommand::Shutdown(cmd)) => {
            let _ = cmd.reply.send(Ok(()));
            info!("NarrativeBackend shutting down");
            break;
          }
        , None => {
            debug!("Command channel closed");
            break;
          }
      }
    }
}
