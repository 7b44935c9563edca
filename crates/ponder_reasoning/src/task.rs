use crate::domain::{Domain, ReasoningType};
use ponder_core::OrchestrationError;
use serde::Deserialize;
use serde_json::Value;

/// Inbound task for the ReAct engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReactTask {
    pub query: String,
    #[serde(default)]
    pub domain: Option<Domain>,
    #[serde(default, alias = "reasoningType")]
    pub reasoning_type: Option<ReasoningType>,
    /// Structured input for the domain reasoner.
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl ReactTask {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Build a task from a raw query, picking up domain fields when the query
    /// itself is a JSON object such as
    /// `{"domain": "financial", "reasoningType": "deductive", "data": {...}}`.
    ///
    /// Anything that is not a JSON object with a string `domain` is treated
    /// as plain text with no domain.
    pub fn from_query(query: impl Into<String>) -> Self {
        let mut task = Self::new(query);
        task.detect_domain();
        task
    }

    pub fn with_domain(mut self, domain: Domain, reasoning_type: ReasoningType) -> Self {
        self.domain = Some(domain);
        self.reasoning_type = Some(reasoning_type);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider;
        self
    }

    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.query.trim().is_empty() {
            return Err(OrchestrationError::InvalidTask("query must not be empty".into()));
        }
        Ok(())
    }

    /// Fill in domain and payload from the query when the caller left them unset.
    pub(crate) fn detect_domain(&mut self) {
        let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(self.query.trim()) else {
            return;
        };

        if self.domain.is_none() {
            let Some(name) = fields.get("domain").and_then(Value::as_str) else {
                return;
            };
            match name.parse::<Domain>() {
                Ok(domain) => self.domain = Some(domain),
                Err(e) => {
                    tracing::warn!("Ignoring domain in query: {}", e);
                    return;
                }
            }
        }

        if self.reasoning_type.is_none() {
            self.reasoning_type = fields
                .get("reasoningType")
                .and_then(Value::as_str)
                .and_then(|s| match s.parse::<ReasoningType>() {
                    Ok(t) => Some(t),
                    Err(e) => {
                        tracing::warn!("{}; using both", e);
                        None
                    }
                });
        }

        if self.payload.is_none() {
            self.payload = Some(Value::Object(fields));
        }
    }
}

/// Inbound task for a pipeline agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineTask {
    #[serde(alias = "inputText")]
    pub input_text: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, alias = "systemMessage")]
    pub system_message: Option<String>,
    #[serde(default, alias = "maxTokens")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub model: Option<String>,
}

impl PipelineTask {
    pub fn new(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.input_text.trim().is_empty() {
            return Err(OrchestrationError::InvalidTask(
                "input_text must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_query_has_no_domain() {
        let task = ReactTask::from_query("What is 3*(4+2)?");
        assert!(task.domain.is_none());
        assert!(task.payload.is_none());
    }

    #[test]
    fn test_json_query_with_domain() {
        let task = ReactTask::from_query(
            r#"{"domain": "financial", "reasoningType": "deductive",
                "data": {"expectedReturn": 0.12, "riskLevel": "low"}}"#,
        );
        assert_eq!(task.domain, Some(Domain::Financial));
        assert_eq!(task.reasoning_type, Some(ReasoningType::Deductive));
        assert_eq!(task.payload.unwrap()["data"]["riskLevel"], "low");
    }

    #[test]
    fn test_unknown_domain_is_ignored() {
        let task = ReactTask::from_query(r#"{"domain": "astrology"}"#);
        assert!(task.domain.is_none());
        assert!(task.payload.is_none());
    }

    #[test]
    fn test_non_json_expression_is_never_evaluated() {
        // A Python-style literal is not JSON and must be treated as text.
        let task = ReactTask::from_query("{'domain': 'legal', 'caseType': __import__('os')}");
        assert!(task.domain.is_none());
    }

    #[test]
    fn test_explicit_domain_keeps_payload() {
        let mut task = ReactTask::new("Should I invest?")
            .with_domain(Domain::Financial, ReasoningType::Deductive)
            .with_payload(json!({"expectedReturn": 0.12, "riskLevel": "low"}));
        task.detect_domain();
        assert_eq!(task.payload.unwrap()["expectedReturn"], 0.12);
    }

    #[test]
    fn test_pipeline_task_camel_case_aliases() {
        let task: PipelineTask = serde_json::from_value(json!({
            "inputText": "AI in healthcare",
            "systemMessage": "Be concise.",
            "maxTokens": 80,
            "temperature": 0.2
        }))
        .unwrap();
        assert_eq!(task.input_text, "AI in healthcare");
        assert_eq!(task.system_message.as_deref(), Some("Be concise."));
        assert_eq!(task.max_tokens, Some(80));
        assert!(task.validate().is_ok());
        assert!(PipelineTask::new("  ").validate().is_err());
    }

    #[test]
    fn test_react_task_deserialize() {
        let task: ReactTask = serde_json::from_value(json!({
            "query": "Is this contract valid?",
            "domain": "legal",
            "reasoningType": "both",
            "payload": {"caseType": "contract", "signed": true}
        }))
        .unwrap();
        assert_eq!(task.domain, Some(Domain::Legal));
        assert_eq!(task.reasoning_type, Some(ReasoningType::Both));
    }
}
