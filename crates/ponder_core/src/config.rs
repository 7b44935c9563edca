use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PonderConfig {
    pub llm: LlmConfig,
    pub providers: ProvidersConfig,
    pub react: ReactConfig,
    pub pipeline: PipelineConfig,
}

impl PonderConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: PonderConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    ///
    /// This is the only place the process environment is consulted; provider
    /// clients receive the resulting struct explicitly.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PONDER_PROVIDER") {
            self.llm.default_provider = v;
        }
        if let Ok(v) = std::env::var("PONDER_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.llm.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PONDER_MAX_STEPS") {
            if let Ok(n) = v.parse() {
                self.react.max_steps = n;
            }
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.providers.openai.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.providers.openai.base_url = v;
        }
        if let Ok(v) = std::env::var("OPENAI_MODEL") {
            self.providers.openai.model = v;
        }
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            self.providers.gemini.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("GEMINI_ENDPOINT") {
            self.providers.gemini.base_url = v;
        }
        if let Ok(v) = std::env::var("GEMINI_MODEL") {
            self.providers.gemini.model = v;
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used when a request does not name one.
    pub default_provider: String,
    /// Per-call deadline for a single backend request.
    pub timeout_secs: u64,
    /// Calls beyond this limit queue until a slot frees up.
    pub max_concurrent_calls: usize,
    pub retry: RetryConfig,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "gemini".to_string(),
            timeout_secs: 30,
            max_concurrent_calls: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry at the provider boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Multiplier for each subsequent delay.
    pub backoff_factor: f64,
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    /// Base URL up to (not including) `/models/{model}:generateContent`.
    pub base_url: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReactConfig {
    /// Generation calls allowed before the run fails with a step-limit error.
    pub max_steps: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Opening line of the system prompt, before the tool catalogue.
    pub system_preamble: String,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_tokens: 2048,
            temperature: 0.0,
            system_preamble: "You are a smart assistant with access to these tools:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_message: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.7,
            system_message: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = PonderConfig::default();
        assert_eq!(cfg.llm.default_provider, "gemini");
        assert_eq!(cfg.llm.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.llm.retry.max_attempts, 2);
        assert_eq!(cfg.react.max_steps, 10);
        assert!(cfg.providers.openai.api_key.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[llm]
default_provider = "openai"
"#;
        let cfg: PonderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.default_provider, "openai");
        // Defaults for unspecified fields
        assert_eq!(cfg.llm.max_concurrent_calls, 4);
        assert_eq!(cfg.react.max_steps, 10);
        assert_eq!(cfg.pipeline.max_tokens, 150);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[llm]
default_provider = "mock"
timeout_secs = 5
max_concurrent_calls = 2

[llm.retry]
max_attempts = 3
initial_delay_ms = 100
max_delay_ms = 1000
backoff_factor = 1.5

[providers.openai]
api_key = "sk-test"
base_url = "http://localhost:8080/v1"
model = "gpt-4o"

[providers.gemini]
model = "gemini-pro"

[react]
max_steps = 4
max_tokens = 512
temperature = 0.2

[pipeline]
max_tokens = 300
temperature = 0.5
system_message = "You are a research assistant."
"#;
        let cfg: PonderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.default_provider, "mock");
        assert_eq!(cfg.llm.timeout_secs, 5);
        assert_eq!(cfg.llm.retry.max_attempts, 3);
        assert_eq!(cfg.llm.retry.initial_delay(), Duration::from_millis(100));
        assert_eq!(cfg.providers.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.providers.openai.model, "gpt-4o");
        assert_eq!(cfg.providers.gemini.model, "gemini-pro");
        assert!(cfg.providers.gemini.api_key.is_none());
        assert_eq!(cfg.react.max_steps, 4);
        assert_eq!(
            cfg.pipeline.system_message.as_deref(),
            Some("You are a research assistant.")
        );
    }

    #[test]
    fn test_retry_none_is_single_attempt() {
        assert_eq!(RetryConfig::none().max_attempts, 1);
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        // Part 1: env overrides
        std::env::set_var("PONDER_PROVIDER", "openai");
        std::env::set_var("PONDER_MAX_STEPS", "3");

        let mut cfg = PonderConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.llm.default_provider, "openai");
        assert_eq!(cfg.react.max_steps, 3);

        // Clean up env vars before testing defaults
        std::env::remove_var("PONDER_PROVIDER");
        std::env::remove_var("PONDER_MAX_STEPS");

        // Part 2: nonexistent path returns defaults (no env interference)
        let cfg = PonderConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.llm.default_provider, "gemini");
    }
}
