use crate::llm::{Completion, CompletionRequest, LlmClient, Usage};
use crate::retry::{classify_status, classify_transport};
use anyhow::{Context, Result};
use ponder_core::config::GeminiConfig;
use ponder_core::ProviderError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

// ============================================================================
// Wire types (generateContent)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

impl GeminiClient {
    pub fn new(api_key: &str, config: &GeminiConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .build()
                .context("Failed to build Gemini HTTP client")?,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn body(request: &CompletionRequest) -> GenerateRequest {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: request.system.clone(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.params.temperature,
                max_output_tokens: request.params.max_tokens,
                stop_sequences: request.stop.clone(),
            },
        }
    }
}

fn into_completion(response: GenerateResponse) -> Result<Completion, ProviderError> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| ProviderError::backend("Gemini returned no candidates"))?;

    let text = content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string();

    let usage = response
        .usage_metadata
        .map(|u| Usage::exact(u.prompt_token_count, u.candidates_token_count));

    Ok(Completion { text, usage })
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn default_model(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let response = self
            .client
            .post(self.endpoint(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| classify_transport("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status("Gemini", status, &error_text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| classify_transport("Gemini", e))?;
        into_completion(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionParams;

    #[test]
    fn test_request_body_camel_case() {
        let request = CompletionRequest {
            system: "be brief".into(),
            prompt: "hello".into(),
            model: "gemini-2.0-flash".into(),
            params: CompletionParams {
                max_tokens: 60,
                temperature: 0.0,
            },
            stop: vec!["Observation:".into()],
        };
        let json = serde_json::to_value(GeminiClient::body(&request)).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 60);
        assert_eq!(json["generationConfig"]["stopSequences"][0], "Observation:");
    }

    #[test]
    fn test_endpoint_uses_model() {
        let client = GeminiClient::new("k", &GeminiConfig::default()).unwrap();
        assert_eq!(
            client.endpoint("gemini-pro"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn test_response_with_usage_metadata() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "Answer: " }, { "text": "18" }]
                }
            }],
            "usageMetadata": {
                "promptTokenCount": 40,
                "candidatesTokenCount": 2,
                "totalTokenCount": 42
            }
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let completion = into_completion(parsed).unwrap();
        assert_eq!(completion.text, "Answer: 18");
        assert_eq!(completion.usage, Some(Usage::exact(40, 2)));
    }

    #[test]
    fn test_response_without_usage_leaves_estimate_to_caller() {
        let raw = r#"{ "candidates": [{ "content": { "parts": [{ "text": "hi" }] } }] }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(into_completion(parsed).unwrap().usage.is_none());
    }

    #[test]
    fn test_no_candidates_is_backend_error() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{ "candidates": [] }"#).unwrap();
        assert!(matches!(
            into_completion(parsed),
            Err(ProviderError::Backend { .. })
        ));
    }
}
