use async_trait::async_trait;
use log::trace;

pub const STUB_RESPONSE: &str
  = "This is a mock response from the LLM for testing purposes.";

/// Offline provider. Always answers with the same text.
#[derive(Debug, Clone, Default)]
pub struct StubClient;

impl StubClient
{   pub fn new() -> Self
    {   StubClient
    }
}

#[async_trait]
impl super::CompletionProvider for StubClient
{   async fn generate(&self, prompt: &str) -> crate::Result<String>
    {   trace!("Stub generate, prompt of {} bytes", prompt.len());
        Ok(STUB_RESPONSE.to_string())
    }

    fn name(&self) -> &str
    {   "mock"
    }
}
