//! ReAct engine: generate → parse → act → observe until an answer appears
//! or the step budget runs out.

use crate::client::ProviderClient;
use crate::domain::{DomainHint, DomainReasoner};
use crate::llm::{ProviderRequest, Usage};
use crate::prompts::{PromptBuilder, REACT_STOP_SEQUENCE};
use crate::react_parser::{parse_step, parse_thought, ActionRequest, ParsedStep};
use crate::task::ReactTask;
use crate::tool_registry::ToolRegistry;
use ponder_core::config::ReactConfig;
use ponder_core::{Conversation, Message, OrchestrationError};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Outcome types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model emitted an explicit `Answer:`.
    Answer,
    /// The model replied without any protocol marker.
    Fallback,
    /// The backend failed; its error text is the answer.
    ProviderError,
}

/// One generation and whatever it led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub step: usize,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactOutcome {
    pub run_id: String,
    pub answer: String,
    pub finish_reason: FinishReason,
    pub steps: usize,
    pub trace: Vec<TraceStep>,
    /// Every message of the run in order: system prompt, user query, the
    /// domain hint when one was computed, then assistant and observation turns.
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<DomainHint>,
    pub usage: Usage,
}

// ============================================================================
// Engine
// ============================================================================

pub struct ReactEngine {
    client: Arc<ProviderClient>,
    registry: Arc<ToolRegistry>,
    config: ReactConfig,
    system_prompt: String,
}

impl ReactEngine {
    pub fn new(
        client: Arc<ProviderClient>,
        registry: Arc<ToolRegistry>,
        config: ReactConfig,
    ) -> Self {
        let system_prompt = PromptBuilder::react_system(&config.system_preamble, &registry);
        Self {
            client,
            registry,
            config,
            system_prompt,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Drive one task to completion.
    ///
    /// Fails with `StepLimitExceeded` when no answer appears within
    /// `max_steps` generations, `Cancelled` when the token fires, and
    /// `InvalidTask` for an empty query. Provider failures end the run
    /// normally with `FinishReason::ProviderError`.
    #[tracing::instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        mut task: ReactTask,
        cancel: &CancellationToken,
    ) -> Result<ReactOutcome, OrchestrationError> {
        task.validate()?;
        task.detect_domain();

        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let mut conversation = Conversation::new(self.system_prompt.clone());
        conversation.push(Message::user(task.query.clone()));

        let hint = task.domain.map(|domain| {
            let payload = task
                .payload
                .clone()
                .unwrap_or_else(|| serde_json::json!({}));
            DomainReasoner::evaluate(domain, task.reasoning_type.unwrap_or_default(), &payload)
        });
        if let Some(hint) = &hint {
            tracing::info!(
                "Domain hint ({}, {}): {}",
                hint.domain,
                hint.reasoning_type,
                hint.preliminary_result.as_deref().unwrap_or("<none>")
            );
            conversation.push(Message::system(hint.as_system_message()));
        }

        tracing::info!("ReAct run started (max_steps={})", self.config.max_steps);

        let mut trace = Vec::new();
        let mut usage = Usage::default();
        let mut last_action: Option<ActionRequest> = None;

        let finish = |answer: String,
                      reason: FinishReason,
                      trace: Vec<TraceStep>,
                      usage: Usage,
                      conversation: Conversation| {
            tracing::info!("ReAct run finished after {} step(s): {:?}", trace.len(), reason);
            ReactOutcome {
                run_id: run_id.clone(),
                answer,
                finish_reason: reason,
                steps: trace.len(),
                trace,
                messages: conversation.into_messages(),
                hint: hint.clone(),
                usage,
            }
        };

        for step in 1..=self.config.max_steps {
            if cancel.is_cancelled() {
                tracing::info!("ReAct run cancelled before step {}", step);
                return Err(OrchestrationError::Cancelled);
            }

            let request = ProviderRequest::new(conversation.render_transcript())
                .system(conversation.system_instruction())
                .max_tokens(self.config.max_tokens)
                .temperature(self.config.temperature)
                .provider(task.provider.clone())
                .stop(vec![REACT_STOP_SEQUENCE.to_string()]);

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("ReAct run cancelled during step {}", step);
                    return Err(OrchestrationError::Cancelled);
                }
                response = self.client.generate(request) => response,
            };
            usage += response.usage;

            if !response.is_success() {
                let detail = format!(
                    "Provider error: {}",
                    response.error_detail().unwrap_or_default()
                );
                tracing::warn!("Step {}: {}", step, detail);
                conversation.push(Message::observation(detail.clone()));
                trace.push(TraceStep {
                    step,
                    reply: String::new(),
                    thought: None,
                    action: None,
                    observation: Some(detail.clone()),
                });
                return Ok(finish(
                    detail,
                    FinishReason::ProviderError,
                    trace,
                    usage,
                    conversation,
                ));
            }

            let reply = response.text;
            tracing::debug!("Step {} reply: {}", step, reply);
            conversation.push(Message::assistant(reply.clone()));
            let thought = parse_thought(&reply);

            match parse_step(&reply) {
                ParsedStep::Answer(answer) => {
                    trace.push(TraceStep {
                        step,
                        reply,
                        thought,
                        action: None,
                        observation: None,
                    });
                    return Ok(finish(answer, FinishReason::Answer, trace, usage, conversation));
                }
                ParsedStep::Fallback(answer) => {
                    tracing::debug!("Step {}: no protocol marker, using reply as answer", step);
                    trace.push(TraceStep {
                        step,
                        reply,
                        thought,
                        action: None,
                        observation: None,
                    });
                    return Ok(finish(
                        answer,
                        FinishReason::Fallback,
                        trace,
                        usage,
                        conversation,
                    ));
                }
                ParsedStep::Action(action) => {
                    if last_action.as_ref() == Some(&action) {
                        tracing::warn!(
                            "Step {}: repeated action {}[{}]",
                            step,
                            action.tool_name,
                            action.tool_input
                        );
                    }
                    tracing::info!("Tool: {} input: {:?}", action.tool_name, action.tool_input);
                    let observation = self
                        .registry
                        .invoke(&action.tool_name, &action.tool_input)
                        .await;
                    conversation.push(Message::observation(observation.clone()));
                    trace.push(TraceStep {
                        step,
                        reply,
                        thought,
                        action: Some(action.clone()),
                        observation: Some(observation),
                    });
                    last_action = Some(action);
                }
                ParsedStep::Empty => {
                    tracing::warn!("Step {}: empty reply", step);
                    let observation = PromptBuilder::empty_reply_observation().to_string();
                    conversation.push(Message::observation(observation.clone()));
                    trace.push(TraceStep {
                        step,
                        reply,
                        thought: None,
                        action: None,
                        observation: Some(observation),
                    });
                }
            }
        }

        tracing::warn!(
            "ReAct run exhausted {} step(s) without an answer",
            self.config.max_steps
        );
        Err(OrchestrationError::StepLimitExceeded {
            steps: self.config.max_steps,
        })
    }
}
