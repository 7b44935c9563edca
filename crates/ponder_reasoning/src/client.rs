//! Provider Client: one entry point over every configured backend.
//!
//! Resolves the backend from the request's provider identifier, validates the
//! request, queues the call behind a shared concurrency limiter, applies the
//! per-call timeout and the bounded retry policy, and fills in estimated usage
//! for backends that do not report it. Every failure comes back as a
//! `ProviderResponse` with `status: Error`.

use crate::llm::{
    Completion, CompletionParams, CompletionRequest, LlmClient, ProviderKind, ProviderRequest,
    ProviderResponse, Usage,
};
use crate::providers::{GeminiClient, MockClient, OpenAiClient};
use crate::retry::with_retry;
use anyhow::Result;
use ponder_core::config::{LlmConfig, RetryConfig};
use ponder_core::{PonderConfig, ProviderError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct ProviderClient {
    default_provider: ProviderKind,
    backends: HashMap<ProviderKind, Arc<dyn LlmClient>>,
    limiter: Arc<Semaphore>,
    timeout: Duration,
    retry: RetryConfig,
}

impl ProviderClient {
    /// Client with no backends registered. Use `with_backend` to add them.
    pub fn new(default_provider: ProviderKind, llm: &LlmConfig) -> Self {
        Self {
            default_provider,
            backends: HashMap::new(),
            limiter: Arc::new(Semaphore::new(llm.max_concurrent_calls.max(1))),
            timeout: llm.timeout(),
            retry: llm.retry.clone(),
        }
    }

    /// Build every backend the configuration has credentials for.
    ///
    /// The mock backend is always available. A backend without an API key is
    /// left unregistered; requests for it fail with an authentication error.
    pub fn from_config(config: &PonderConfig) -> Result<Self> {
        let default_provider: ProviderKind = config.llm.default_provider.parse()?;
        let mut client = Self::new(default_provider, &config.llm)
            .with_backend(ProviderKind::Mock, Arc::new(MockClient::new("mock-echo")));

        if let Some(key) = &config.providers.openai.api_key {
            let openai = OpenAiClient::new(key, &config.providers.openai)?;
            client = client.with_backend(ProviderKind::OpenAi, Arc::new(openai));
        }
        if let Some(key) = &config.providers.gemini.api_key {
            let gemini = GeminiClient::new(key, &config.providers.gemini)?;
            client = client.with_backend(ProviderKind::Gemini, Arc::new(gemini));
        }

        tracing::info!(
            "Provider client ready: default={}, backends=[{}]",
            client.default_provider,
            client.configured().iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(client)
    }

    /// Register (or replace) the backend for `kind`.
    pub fn with_backend(mut self, kind: ProviderKind, backend: Arc<dyn LlmClient>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    /// Backends with a registered client, in declaration order.
    pub fn configured(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.backends.contains_key(k))
            .collect()
    }

    /// Send one generation request.
    pub async fn generate(&self, request: ProviderRequest) -> ProviderResponse {
        let kind = match request.provider.as_deref() {
            Some(name) => match name.parse::<ProviderKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!("Rejected request: {}", e);
                    return ProviderResponse::failure(e, "none");
                }
            },
            None => self.default_provider,
        };

        let Some(backend) = self.backends.get(&kind) else {
            return ProviderResponse::failure(
                ProviderError::Authentication(format!(
                    "{} backend is not configured (missing API key)",
                    kind
                )),
                "none",
            );
        };

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| backend.default_model().to_string());

        if let Err(e) = request.validate() {
            tracing::warn!("Rejected request for {}: {}", kind, e);
            return ProviderResponse::failure(e, model);
        }

        let completion_request = CompletionRequest {
            system: request.system_message,
            prompt: request.prompt,
            model: model.clone(),
            params: CompletionParams {
                max_tokens: request.max_tokens,
                temperature: request.temperature,
            },
            stop: request.stop,
        };

        tracing::debug!(
            provider = %kind,
            model = %model,
            prompt_chars = completion_request.prompt.len(),
            "Generation request"
        );

        let result = with_retry(&self.retry, kind.as_str(), || {
            self.call_once(backend.as_ref(), &completion_request)
        })
        .await;

        match result {
            Ok(Completion { text, usage }) => {
                let usage = usage.unwrap_or_else(|| {
                    Usage::estimate(
                        completion_request.prompt.chars().count()
                            + completion_request.system.chars().count(),
                        text.chars().count(),
                    )
                });
                tracing::debug!(
                    provider = %kind,
                    completion_chars = text.len(),
                    "Generation reply"
                );
                ProviderResponse::success(text, usage, model)
            }
            Err(e) => {
                tracing::warn!(provider = %kind, kind = e.kind(), "Generation failed: {}", e);
                ProviderResponse::failure(e, model)
            }
        }
    }

    /// One attempt: wait for a limiter slot, then race the backend against the deadline.
    async fn call_once(
        &self,
        backend: &dyn LlmClient,
        request: &CompletionRequest,
    ) -> Result<Completion, ProviderError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ProviderError::backend("provider client is shutting down"))?;

        match tokio::time::timeout(self.timeout, backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                after: self.timeout,
            }),
        }
    }
}
