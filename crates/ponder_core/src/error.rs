//! Error taxonomy shared by the provider layer, the tool layer and the
//! orchestration engines.
//!
//! Provider and tool errors are recovered locally (turned into response
//! status or observation text). Only `OrchestrationError` reaches the caller.

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Provider layer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("invalid provider '{name}' (available: {available})")]
    InvalidProvider { name: String, available: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("backend error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Backend {
        status: Option<u16>,
        message: String,
    },

    #[error("request timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    pub fn backend(message: impl Into<String>) -> Self {
        ProviderError::Backend {
            status: None,
            message: message.into(),
        }
    }

    /// Whether a bounded retry at the provider boundary may succeed.
    ///
    /// Timeouts, rate limits and server-side failures are retryable; bad
    /// credentials, unknown providers and malformed requests never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } => true,
            ProviderError::Backend {
                status: Some(status),
                ..
            } => *status == 408 || *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Short machine-friendly name of the error kind, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::InvalidProvider { .. } => "invalid_provider",
            ProviderError::Authentication(_) => "authentication",
            ProviderError::Backend { .. } => "backend",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::InvalidRequest(_) => "invalid_request",
        }
    }
}

// ============================================================================
// Tool layer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("unsupported expression")]
    UnsupportedExpression,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Tool \"{0}\" not found")]
    NotFound(String),
}

// ============================================================================
// Orchestration (propagated to the caller)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
    #[error("no final answer produced within {steps} steps")]
    StepLimitExceeded { steps: usize },

    #[error("pipeline stage '{stage}' failed: {detail}")]
    PipelineStageFailed { stage: String, detail: String },

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("run cancelled")]
    Cancelled,
}
