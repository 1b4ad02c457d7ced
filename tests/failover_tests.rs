use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::time::Instant;

use sutradhar::config::{Credential, GeneratorConfig, DEFAULT_FALLBACK_MODELS};
use sutradhar::failover::{AttemptOutcome, FailoverSequence, RetryPolicy};
use sutradhar::providers::{
  CompletionProvider, HttpReply, ModelFilter, OpenRouterClient, Transport
};
use sutradhar::request::CompletionRequest;
use sutradhar::Error;

const PRIMARY: &str = "google/gemma-3-27b-it:free";

/// Replays canned replies and records every request it sees
struct ScriptedTransport
{   script: Mutex<VecDeque<sutradhar::Result<HttpReply>>>
  , calls: Mutex<Vec<(CompletionRequest, Instant)>>
  , models_calls: Mutex<Vec<(Credential, Duration)>>
  , models_reply: HttpReply
}

impl ScriptedTransport
{   fn new(script: Vec<sutradhar::Result<HttpReply>>) -> Arc<Self>
    {   Arc::new(ScriptedTransport
        {   script: Mutex::new(script.into())
          , calls: Mutex::new(vec![])
          , models_calls: Mutex::new(vec![])
          , models_reply: HttpReply::new(200, r#"{"data":[]}"#)
        })
    }

    fn with_models(body: &str) -> Arc<Self>
    {   Arc::new(ScriptedTransport
        {   script: Mutex::new(VecDeque::new())
          , calls: Mutex::new(vec![])
          , models_calls: Mutex::new(vec![])
          , models_reply: HttpReply::new(200, body)
        })
    }

    fn models_called(&self) -> Vec<String>
    {   self.calls.lock().unwrap()
          .iter()
          .map(|(r, _)| r.model.clone())
          .collect()
    }

    fn requests(&self) -> Vec<CompletionRequest>
    {   self.calls.lock().unwrap()
          .iter()
          .map(|(r, _)| r.clone())
          .collect()
    }

    /// Whole seconds between consecutive calls
    fn gaps(&self) -> Vec<u64>
    {   let calls = self.calls.lock().unwrap();
        calls.windows(2)
          .map(|w| (w[1].1 - w[0].1).as_secs())
          .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport
{   async fn post_chat(
      &self
    , request: &CompletionRequest
    ) -> sutradhar::Result<HttpReply>
    {   self.calls.lock().unwrap()
          .push((request.clone(), Instant::now()));
        self.script.lock().unwrap()
          .pop_front()
          .unwrap_or_else(|| Ok(HttpReply::new(500, "script exhausted")))
    }

    async fn get_models(
      &self
    , credential: &Credential
    , timeout: Duration
    ) -> sutradhar::Result<HttpReply>
    {   self.models_calls.lock().unwrap()
          .push((credential.clone(), timeout));
        Ok(self.models_reply.clone())
    }
}

fn ok(content: &str) -> sutradhar::Result<HttpReply>
{   Ok(HttpReply::new(
      200
    , serde_json::json!({
        "id": "gen-1",
        "choices": [
          { "message": { "role": "assistant", "content": content } }
        ]
      }).to_string()
    ))
}

fn status(code: u16) -> sutradhar::Result<HttpReply>
{   Ok(HttpReply::new(code, "{\"error\":\"nope\"}"))
}

fn config() -> GeneratorConfig
{   let mut config = GeneratorConfig::default();
    config.provider.credential = Some(Credential::new("test-key"));
    config
}

fn client(
  model: &str
, transport: Arc<ScriptedTransport>
) -> OpenRouterClient
{   OpenRouterClient::new(model, &config(), None)
      .unwrap()
      .with_transport(transport)
}

#[tokio::test(start_paused = true)]
async fn first_success_returns_content_without_retry()
{   let transport = ScriptedTransport::new(vec![ok("Once upon a time")]);
    let client = client(PRIMARY, transport.clone());

    let start = Instant::now();
    let text = client.generate("Tell me a story").await.unwrap();

    assert_eq!(text, "Once upon a time");
    assert_eq!(transport.models_called(), vec![PRIMARY]);
    assert_eq!(start.elapsed().as_secs(), 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_two_then_four_seconds()
{   let transport = ScriptedTransport::new(vec![
      status(429)
    , status(429)
    , ok("finally")
    ]);
    let client = client(PRIMARY, transport.clone());

    let text = client.generate("p").await.unwrap();

    assert_eq!(text, "finally");
    assert_eq!(transport.models_called(), vec![PRIMARY; 3]);
    assert_eq!(transport.gaps(), vec![2, 4]);
}

#[tokio::test(start_paused = true)]
async fn other_failures_wait_one_second()
{   let transport = ScriptedTransport::new(vec![
      status(503)
    , Err(Error::Http("connection reset".to_string()))
    , ok("recovered")
    ]);
    let client = client(PRIMARY, transport.clone());

    assert_eq!(client.generate("p").await.unwrap(), "recovered");
    assert_eq!(transport.gaps(), vec![1, 1]);
}

#[tokio::test(start_paused = true)]
async fn unreadable_success_body_is_retried()
{   let transport = ScriptedTransport::new(vec![
      Ok(HttpReply::new(200, "<html>gateway</html>"))
    , Ok(HttpReply::new(200, r#"{"choices":[]}"#))
    , ok("parsed")
    ]);
    let client = client(PRIMARY, transport.clone());

    assert_eq!(client.generate("p").await.unwrap(), "parsed");
    assert_eq!(transport.models_called().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn first_fallback_answers_after_primary_exhausted()
{   let transport = ScriptedTransport::new(vec![
      status(429)
    , status(429)
    , status(429)
    , ok("from fallback")
    ]);
    let client = client(PRIMARY, transport.clone());

    let start = Instant::now();
    let text = client.generate("p").await.unwrap();

    assert_eq!(text, "from fallback");
    let called = transport.models_called();
    assert_eq!(called.len(), 4);
    assert_eq!(called[3], DEFAULT_FALLBACK_MODELS[0]);
    assert!(!called.iter().any(|m| m == DEFAULT_FALLBACK_MODELS[1]));
    // 2s + 4s on the primary, no wait after its last attempt
    assert_eq!(start.elapsed().as_secs(), 6);
}

#[tokio::test(start_paused = true)]
async fn every_model_exhausted_is_all_models_failed()
{   let transport = ScriptedTransport::new(vec![]);
    let client = client(PRIMARY, transport.clone());

    let err = client.generate("p").await.unwrap_err();

    match &err
    {   Error::AllModelsFailed { models } => {
          assert_eq!(models.len(), 4);
          assert_eq!(models[0], PRIMARY);
        }
      , other => panic!("unexpected error: {:?}", other)
    }
    assert!(err.is_terminal());
    assert_eq!(transport.models_called().len(), 12);
}

#[tokio::test(start_paused = true)]
async fn primary_listed_as_fallback_is_not_retried()
{   let transport = ScriptedTransport::new(vec![]);
    let client = client("openrouter/auto", transport.clone());

    let err = client.generate("p").await.unwrap_err();

    assert!(matches!(err, Error::AllModelsFailed { ref models } if models.len() == 3));
    let called = transport.models_called();
    assert_eq!(called.len(), 9);
    assert_eq!(
      called.iter().filter(|m| *m == "openrouter/auto").count()
    , 3
    );
}

#[tokio::test(start_paused = true)]
async fn empty_completion_moves_to_next_model_at_once()
{   let transport = ScriptedTransport::new(vec![ok(""), ok("fallback")]);
    let client = client(PRIMARY, transport.clone());

    assert_eq!(client.generate("p").await.unwrap(), "fallback");
    assert_eq!(
      transport.models_called()
    , vec![PRIMARY, DEFAULT_FALLBACK_MODELS[0]]
    );
    assert_eq!(transport.gaps(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn failover_settings_are_configurable()
{   let mut config = config();
    config.failover.max_retries = 0;
    config.failover.fallback_models = vec!["backup/model".to_string()];
    let transport = ScriptedTransport::new(vec![status(429), status(500)]);
    let client = OpenRouterClient::new(PRIMARY, &config, None)
      .unwrap()
      .with_transport(transport.clone());

    let err = client.generate("p").await.unwrap_err();

    assert_eq!(
      err
    , Error::AllModelsFailed
      {   models: vec![PRIMARY.to_string(), "backup/model".to_string()]
      }
    );
    assert_eq!(transport.models_called().len(), 2);
}

#[test]
fn missing_credential_fails_at_construction()
{   let config = GeneratorConfig::default();
    let result = OpenRouterClient::new(PRIMARY, &config, None);
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn blank_credential_counts_as_missing()
{   let mut config = GeneratorConfig::default();
    config.provider.credential = Some(Credential::new("   "));
    let result = OpenRouterClient::new(
      PRIMARY
    , &config
    , Some(Credential::new(""))
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn explicit_credential_is_enough()
{   let config = GeneratorConfig::default();
    let client = OpenRouterClient::new(
      PRIMARY
    , &config
    , Some(Credential::new("per-call"))
    );
    assert!(client.is_ok());
}

#[test]
fn retry_policy_defaults()
{   let policy = RetryPolicy::default();
    assert_eq!(policy.attempts(), 3);
    assert_eq!(policy.rate_limit_backoff(0).as_secs(), 2);
    assert_eq!(policy.rate_limit_backoff(1).as_secs(), 4);
    assert_eq!(policy.retry_delay.as_secs(), 1);
    assert!(policy.has_retry_after(1));
    assert!(!policy.has_retry_after(2));
}

#[test]
fn classify_maps_statuses()
{   assert_eq!(AttemptOutcome::classify(429, ""), AttemptOutcome::RateLimited);
    assert!(matches!(
      AttemptOutcome::classify(502, "bad gateway")
    , AttemptOutcome::Transient(_)
    ));
    assert_eq!(
      AttemptOutcome::classify(
        200
      , r#"{"choices":[{"message":{"content":"hi"}}]}"#
      )
    , AttemptOutcome::Success("hi".to_string())
    );
}

#[test]
fn failover_sequence_skips_primary()
{   let fallbacks: Vec<String> = DEFAULT_FALLBACK_MODELS
      .iter()
      .map(|m| m.to_string())
      .collect();
    let sequence = FailoverSequence::new(
      "meta-llama/llama-3.2-3b-instruct:free"
    , &fallbacks
    );
    assert_eq!(
      sequence.iter().collect::<Vec<_>>()
    , vec![
        "meta-llama/llama-3.2-3b-instruct:free"
      , "mistralai/mistral-7b-instruct:free"
      , "openrouter/auto"
      ]
    );
}

#[tokio::test]
async fn list_models_filters_free_tier()
{   let transport = ScriptedTransport::with_models(
      r#"{"data":[
        {"id":"openai/gpt-4o"},
        {"id":"mistralai/mistral-7b-instruct:free"},
        {"id":"google/gemini-2.0-flash-exp:free"},
        {"id":"anthropic/claude-3-opus"}
      ]}"#
    );
    let client = client(PRIMARY, transport);

    let all = client.list_models(ModelFilter::All).await.unwrap();
    let free = client.list_models(ModelFilter::FreeTier).await.unwrap();

    assert_eq!(all.len(), 4);
    assert_eq!(
      free
    , vec![
        "mistralai/mistral-7b-instruct:free"
      , "google/gemini-2.0-flash-exp:free"
      ]
    );
}

#[tokio::test]
async fn list_models_uses_credential_and_timeout()
{   let transport = ScriptedTransport::with_models(r#"{"data":[]}"#);
    let client = client(PRIMARY, transport.clone());

    assert!(client.list_models(ModelFilter::All).await.unwrap().is_empty());

    let calls = transport.models_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.expose(), "test-key");
    assert_eq!(calls[0].1, Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn every_attempt_carries_credential_and_default_timeout()
{   let transport = ScriptedTransport::new(vec![status(500), ok("done")]);
    let client = client(PRIMARY, transport.clone());

    client.generate("Tell me a story").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests
    {   assert_eq!(request.timeout, Duration::from_secs(45));
        assert_eq!(request.credential.expose(), "test-key");
        assert_eq!(request.prompt, "Tell me a story");
    }
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_and_explicit_credential_reach_the_request()
{   let mut config = config();
    config.provider.timeout_secs = 10;
    let transport = ScriptedTransport::new(vec![ok("done")]);
    let client = OpenRouterClient::new(
      PRIMARY
    , &config
    , Some(Credential::new("per-call"))
    )
      .unwrap()
      .with_transport(transport.clone());

    client.generate("p").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].timeout, Duration::from_secs(10));
    assert_eq!(requests[0].credential.expose(), "per-call");
}

#[test]
fn retry_policy_saturates_instead_of_overflowing()
{   let policy = RetryPolicy::new(
      usize::MAX
    , Duration::from_secs(u64::MAX)
    , Duration::from_secs(1)
    );
    assert_eq!(policy.attempts(), usize::MAX);
    assert_eq!(policy.rate_limit_backoff(1), Duration::MAX);
    assert_eq!(policy.rate_limit_backoff(usize::MAX), Duration::MAX);
}

#[test]
fn out_of_range_failover_settings_are_rejected()
{   let mut huge_backoff = config();
    huge_backoff.failover.rate_limit_backoff_secs = u64::MAX;
    assert!(matches!(
      OpenRouterClient::new(PRIMARY, &huge_backoff, None)
    , Err(Error::Configuration(_))
    ));

    let mut huge_retries = config();
    huge_retries.failover.max_retries = usize::MAX;
    assert!(matches!(
      huge_retries.validate()
    , Err(Error::Configuration(_))
    ));

    let mut no_timeout = config();
    no_timeout.provider.timeout_secs = 0;
    assert!(matches!(
      no_timeout.validate()
    , Err(Error::Configuration(_))
    ));

    assert!(config().validate().is_ok());
}

#[test]
fn request_body_matches_wire_format()
{   let request = CompletionRequest::new(
      "some/model"
    , "hello"
    , Credential::new("k")
    , std::time::Duration::from_secs(45)
    );
    assert_eq!(
      serde_json::to_value(request.body()).unwrap()
    , serde_json::json!({
        "model": "some/model",
        "messages": [{ "role": "user", "content": "hello" }]
      })
    );
}
