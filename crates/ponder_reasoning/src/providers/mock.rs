//! Mock backend: deterministic, offline responses for tests and demos.
//!
//! Replies are taken from a scripted queue first, then from an optional
//! responder closure, and otherwise fall back to a fixed echo line.

use crate::llm::{Completion, CompletionRequest, LlmClient};
use ponder_core::ProviderError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Arc<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;
type Latency = Arc<dyn Fn(&CompletionRequest) -> Duration + Send + Sync>;

pub struct MockClient {
    model: String,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    latency: Option<Latency>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockClient {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            script: Mutex::new(VecDeque::new()),
            responder: None,
            delay: None,
            latency: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue successful replies, returned in order.
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_script(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// Queue replies and errors, returned in order.
    pub fn with_script<I>(self, script: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ProviderError>>,
    {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(script);
        self
    }

    /// Compute replies from the request once the scripted queue is empty.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Per-request latency, overriding `with_delay`.
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Arc::new(latency));
        self
    }

    /// Number of `complete` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match (scripted, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(request),
            (None, None) => Ok(format!(
                "(Mock {} Response) I received your prompt.",
                request.model
            )),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LlmClient for MockClient {
    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = match &self.latency {
            Some(latency) => Some(latency(request)),
            None => self.delay,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let text = self.next_reply(request)?;
        Ok(Completion { text, usage: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionParams;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            system: "system".into(),
            prompt: prompt.into(),
            model: "test-model".into(),
            params: CompletionParams::default(),
            stop: vec![],
        }
    }

    #[tokio::test]
    async fn test_mock_fallback_reply() {
        let mock = MockClient::new("test-model");
        let completion = mock.complete(&request("hi")).await.unwrap();
        assert!(completion.text.contains("Mock"));
        assert!(completion.text.contains("test-model"));
        assert!(completion.usage.is_none());
    }

    #[tokio::test]
    async fn test_mock_script_in_order_then_responder() {
        let mock = MockClient::new("m")
            .with_script([Ok("first".to_string()), Err(ProviderError::backend("rate limited"))])
            .with_responder(|req| Ok(format!("echo: {}", req.prompt)));

        assert_eq!(mock.complete(&request("a")).await.unwrap().text, "first");
        assert!(mock.complete(&request("b")).await.is_err());
        assert_eq!(mock.complete(&request("c")).await.unwrap().text, "echo: c");
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.requests()[2].prompt, "c");
    }
}
