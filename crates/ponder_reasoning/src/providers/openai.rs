use crate::llm::{Completion, CompletionRequest, LlmClient, Usage};
use crate::retry::{classify_status, classify_transport};
use anyhow::{Context, Result};
use ponder_core::config::OpenAiConfig;
use ponder_core::ProviderError;
use reqwest::Client;
use serde_json::{json, Value};

/// Chat-completions backend (OpenAI or any compatible endpoint).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, config: &OpenAiConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .build()
                .context("Failed to build OpenAI HTTP client")?,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn payload(request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.params.max_tokens,
            "temperature": request.params.temperature,
        });
        if !request.stop.is_empty() {
            payload["stop"] = json!(request.stop);
        }
        payload
    }
}

/// Pull the first choice's text and the reported usage out of a response body.
fn parse_response(body: &Value) -> Result<Completion, ProviderError> {
    let text = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ProviderError::backend("OpenAI response has no message content"))?
        .trim()
        .to_string();

    let usage = body.get("usage").and_then(|u| {
        let prompt = u["prompt_tokens"].as_u64()?;
        let completion = u["completion_tokens"].as_u64()?;
        Some(Usage::exact(prompt as u32, completion as u32))
    });

    Ok(Completion { text, usage })
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn default_model(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&Self::payload(request))
            .send()
            .await
            .map_err(|e| classify_transport("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status("OpenAI", status, &error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| classify_transport("OpenAI", e))?;
        parse_response(&body)
    }
}
