use async_trait::async_trait;
use ponder_core::ProviderError;
use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

/// Characters per token used when a backend does not report exact usage.
pub const CHARS_PER_TOKEN: usize = 4;

// ============================================================================
// Provider identity
// ============================================================================

/// The closed set of generation backends. Adding a backend means adding a
/// variant here and a client in `crate::providers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Mock,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mock => "mock",
        }
    }

    fn available() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "mock" => Ok(ProviderKind::Mock),
            _ => Err(ProviderError::InvalidProvider {
                name: s.to_string(),
                available: Self::available(),
            }),
        }
    }
}

// ============================================================================
// Caller-facing request/response
// ============================================================================

/// One generation request as issued by the engine or a pipeline stage.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub prompt: String,
    pub system_message: String,
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Model override; the backend's configured model is used when `None`.
    pub model: Option<String>,
    /// Provider identifier; the client's default backend is used when `None`.
    pub provider: Option<String>,
    pub stop: Vec<String>,
}

impl ProviderRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_message: "You are a helpful assistant.".to_string(),
            max_tokens: 100,
            temperature: 0.7,
            model: None,
            provider: None,
            stop: Vec::new(),
        }
    }

    pub fn system(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider;
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    /// Check the request's input constraints before any backend is touched.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.prompt.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("prompt must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(ProviderError::InvalidRequest("max_tokens must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ProviderError::InvalidRequest(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_units: u32,
    pub completion_units: u32,
    pub total_units: u32,
    /// True when counts were derived from character length rather than
    /// reported by the backend.
    pub estimated: bool,
}

impl Usage {
    pub fn exact(prompt_units: u32, completion_units: u32) -> Self {
        Self {
            prompt_units,
            completion_units,
            total_units: prompt_units + completion_units,
            estimated: false,
        }
    }

    /// Deterministic estimate: one unit per `CHARS_PER_TOKEN` characters.
    pub fn estimate(prompt_chars: usize, completion_chars: usize) -> Self {
        let prompt_units = (prompt_chars / CHARS_PER_TOKEN) as u32;
        let completion_units = (completion_chars / CHARS_PER_TOKEN) as u32;
        Self {
            prompt_units,
            completion_units,
            total_units: prompt_units + completion_units,
            estimated: true,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_units += rhs.prompt_units;
        self.completion_units += rhs.completion_units;
        self.total_units += rhs.total_units;
        self.estimated |= rhs.estimated;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Result of one `ProviderClient::generate` call. Failures are carried here
/// as `status: Error` instead of being raised.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: ResponseStatus,
    pub text: String,
    pub usage: Usage,
    pub model: String,
    pub error: Option<ProviderError>,
}

impl ProviderResponse {
    pub fn success(text: String, usage: Usage, model: String) -> Self {
        Self {
            status: ResponseStatus::Success,
            text,
            usage,
            model,
            error: None,
        }
    }

    pub fn failure(error: ProviderError, model: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            text: String::new(),
            usage: Usage::default(),
            model: model.into(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

// ============================================================================
// Backend-facing seam
// ============================================================================

/// Parameters for a single backend completion.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// What a backend receives: already validated, model resolved.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub model: String,
    pub params: CompletionParams,
    pub stop: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// `None` when the backend does not report token counts.
    pub usage: Option<Usage>,
}

/// The only place a backend's wire protocol enters the runtime.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model used when the request does not name one.
    fn default_model(&self) -> &str;

    /// Perform exactly one outbound completion call.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}
