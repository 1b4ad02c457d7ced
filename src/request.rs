//! Completion request value and chat-completion wire types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::config::Credential;

/// One call against one model. Built per attempt, never mutated.
#[derive(Debug, Clone)]
pub struct CompletionRequest
{   /// Remote model identifier
    pub model: String
  , /// Fully rendered instruction text
    pub prompt: String
  , /// Bearer token
    pub credential: Credential
  , /// Bound on this single HTTP attempt
    pub timeout: Duration
}

impl CompletionRequest
{   pub fn new(
      model: impl Into<String>
    , prompt: impl Into<String>
    , credential: Credential
    , timeout: Duration
    ) -> Self
    {   CompletionRequest
        {   model: model.into()
          , prompt: prompt.into()
          , credential
          , timeout
        }
    }

    /// Request body for the chat-completions endpoint
    pub fn body(&self) -> ChatRequest
    {   ChatRequest
        {   model: self.model.clone()
          , messages: vec![ChatMessage::user(self.prompt.clone())]
        }
    }
}

// ===== Wire Types =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

impl ChatMessage
{   pub fn user(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: "user".to_string()
          , content: content.into()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse
{   pub choices: Vec<Choice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChoiceMessage
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage
{   #[serde(default)]
    pub content: Option<String>
}

impl ChatResponse
{   /// `choices[0].message.content`
    pub fn first_content(self) -> crate::Result<String>
    {   self.choices.into_iter()
          .next()
          .ok_or(crate::Error::NoChoicesInResponse)
          .map(|c| c.message.content.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse
{   pub data: Vec<ModelData>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelData
{   pub id: String
}
