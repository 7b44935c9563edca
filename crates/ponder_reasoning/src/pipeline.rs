//! Linear pipeline executor.
//!
//! Stages run strictly in order; each stage's prompt is built from the task
//! and the records of every earlier stage. Fan-out stages issue one call per
//! derived item concurrently and keep results in item order. Aggregation is
//! a pure function over the finished records.

use crate::client::ProviderClient;
use crate::llm::{ProviderRequest, Usage};
use crate::task::PipelineTask;
use futures_util::future::join_all;
use ponder_core::config::PipelineConfig;
use ponder_core::OrchestrationError;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// What a prompt template sees when it runs.
pub struct StageInput<'a> {
    pub task: &'a PipelineTask,
    /// Records of the stages that already finished, in order.
    pub records: &'a [StageRecord],
    /// Token limit resolved for this stage.
    pub max_tokens: u32,
}

pub type PromptFn = Arc<dyn Fn(&StageInput<'_>) -> String + Send + Sync>;
pub type ItemsFn = Arc<dyn Fn(&StageInput<'_>) -> Vec<String> + Send + Sync>;
pub type ItemPromptFn = Arc<dyn Fn(&StageInput<'_>, &str) -> String + Send + Sync>;
pub type PlaceholderFn = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type AggregateFn = Arc<dyn Fn(&PipelineTask, &[StageRecord]) -> String + Send + Sync>;

// ============================================================================
// Definitions
// ============================================================================

pub enum StageKind {
    /// One generation call.
    Single { prompt: PromptFn },
    /// One generation call per item derived from earlier records.
    FanOut { items: ItemsFn, prompt: ItemPromptFn },
}

pub enum Criticality {
    /// Failure aborts the pipeline.
    Required,
    /// Failure substitutes the placeholder (given the item, or the task input
    /// for single stages) and the pipeline continues.
    BestEffort(PlaceholderFn),
}

pub struct PipelineStage {
    pub name: String,
    pub kind: StageKind,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Stage default, used when neither the task nor the config sets one.
    pub system_message: Option<String>,
    pub criticality: Criticality,
    /// Whether the task's `max_tokens` / `temperature` override this stage.
    pub tunable: bool,
}

impl PipelineStage {
    pub fn single<F>(name: &str, prompt: F) -> Self
    where
        F: Fn(&StageInput<'_>) -> String + Send + Sync + 'static,
    {
        Self::with_kind(
            name,
            StageKind::Single {
                prompt: Arc::new(prompt),
            },
        )
    }

    pub fn fan_out<I, P>(name: &str, items: I, prompt: P) -> Self
    where
        I: Fn(&StageInput<'_>) -> Vec<String> + Send + Sync + 'static,
        P: Fn(&StageInput<'_>, &str) -> String + Send + Sync + 'static,
    {
        Self::with_kind(
            name,
            StageKind::FanOut {
                items: Arc::new(items),
                prompt: Arc::new(prompt),
            },
        )
    }

    fn with_kind(name: &str, kind: StageKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            max_tokens: None,
            temperature: None,
            system_message: None,
            criticality: Criticality::Required,
            tunable: false,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn system(mut self, system_message: &str) -> Self {
        self.system_message = Some(system_message.to_string());
        self
    }

    pub fn best_effort<F>(mut self, placeholder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.criticality = Criticality::BestEffort(Arc::new(placeholder));
        self
    }

    pub fn tunable(mut self) -> Self {
        self.tunable = true;
        self
    }
}

/// Immutable pipeline definition, shareable across concurrent runs.
pub struct Pipeline {
    pub name: String,
    pub stages: Vec<PipelineStage>,
    pub aggregate: AggregateFn,
}

impl Pipeline {
    pub fn new<F>(name: &str, stages: Vec<PipelineStage>, aggregate: F) -> Self
    where
        F: Fn(&PipelineTask, &[StageRecord]) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            stages,
            aggregate: Arc::new(aggregate),
        }
    }
}

// ============================================================================
// Run records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutput {
    /// Fan-out item this output belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub text: String,
    /// True when `text` is a placeholder standing in for a failed call.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub outputs: Vec<StageOutput>,
    pub usage: Usage,
}

impl StageRecord {
    /// Text of the first output, or "" when the stage produced nothing.
    pub fn text(&self) -> &str {
        self.outputs.first().map_or("", |o| o.text.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub pipeline: String,
    pub stages: Vec<StageRecord>,
    /// Outputs of the final stage, in order.
    pub stage_outputs: Vec<String>,
    pub aggregate: String,
    pub usage: Usage,
}

// ============================================================================
// Executor
// ============================================================================

pub struct PipelineExecutor {
    client: Arc<ProviderClient>,
    defaults: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(client: Arc<ProviderClient>, defaults: PipelineConfig) -> Self {
        Self { client, defaults }
    }

    #[tracing::instrument(
        skip_all,
        fields(pipeline = %pipeline.name, run_id = tracing::field::Empty)
    )]
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        task: &PipelineTask,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, OrchestrationError> {
        task.validate()?;

        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        tracing::info!("Pipeline '{}' started ({} stages)", pipeline.name, pipeline.stages.len());

        let mut records: Vec<StageRecord> = Vec::with_capacity(pipeline.stages.len());
        let mut usage = Usage::default();

        for stage in &pipeline.stages {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Pipeline '{}' cancelled before stage {}",
                    pipeline.name,
                    stage.name
                );
                return Err(OrchestrationError::Cancelled);
            }

            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        "Pipeline '{}' cancelled during stage {}",
                        pipeline.name,
                        stage.name
                    );
                    return Err(OrchestrationError::Cancelled);
                }
                record = self.run_stage(stage, task, &records) => record?,
            };

            usage += record.usage;
            records.push(record);
        }

        let stage_outputs = records
            .last()
            .map(|r| r.outputs.iter().map(|o| o.text.clone()).collect())
            .unwrap_or_default();
        let aggregate = (pipeline.aggregate)(task, &records);

        tracing::info!(
            "Pipeline '{}' finished: {} stage(s), {} final output(s)",
            pipeline.name,
            records.len(),
            records.last().map_or(0, |r| r.outputs.len())
        );

        Ok(PipelineOutcome {
            run_id,
            pipeline: pipeline.name.clone(),
            stages: records,
            stage_outputs,
            aggregate,
            usage,
        })
    }

    async fn run_stage(
        &self,
        stage: &PipelineStage,
        task: &PipelineTask,
        records: &[StageRecord],
    ) -> Result<StageRecord, OrchestrationError> {
        let max_tokens = stage
            .tunable
            .then_some(task.max_tokens)
            .flatten()
            .or(stage.max_tokens)
            .unwrap_or(self.defaults.max_tokens);
        let temperature = stage
            .tunable
            .then_some(task.temperature)
            .flatten()
            .or(stage.temperature)
            .unwrap_or(self.defaults.temperature);
        let system = task
            .system_message
            .clone()
            .or_else(|| self.defaults.system_message.clone())
            .or_else(|| stage.system_message.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string());

        let input = StageInput {
            task,
            records,
            max_tokens,
        };

        // (item, prompt) per call
        let calls: Vec<(Option<String>, String)> = match &stage.kind {
            StageKind::Single { prompt } => vec![(None, prompt(&input))],
            StageKind::FanOut { items, prompt } => items(&input)
                .into_iter()
                .map(|item| {
                    let p = prompt(&input, &item);
                    (Some(item), p)
                })
                .collect(),
        };

        tracing::debug!("Stage {}: {} call(s)", stage.name, calls.len());

        let responses = join_all(calls.iter().map(|(_, prompt)| {
            let request = ProviderRequest::new(prompt.clone())
                .system(system.clone())
                .max_tokens(max_tokens)
                .temperature(temperature)
                .model(task.model.clone())
                .provider(task.provider.clone());
            self.client.generate(request)
        }))
        .await;

        let mut usage = Usage::default();
        let mut outputs = Vec::with_capacity(responses.len());

        for ((item, _), response) in calls.into_iter().zip(responses) {
            usage += response.usage;
            if response.is_success() {
                outputs.push(StageOutput {
                    item,
                    text: response.text.trim().to_string(),
                    degraded: false,
                    error: None,
                });
                continue;
            }

            let detail = response.error_detail().unwrap_or_default();
            match &stage.criticality {
                Criticality::Required => {
                    tracing::warn!("Required stage {} failed: {}", stage.name, detail);
                    return Err(OrchestrationError::PipelineStageFailed {
                        stage: stage.name.clone(),
                        detail,
                    });
                }
                Criticality::BestEffort(placeholder) => {
                    let subject = item.as_deref().unwrap_or(task.input_text.as_str());
                    tracing::warn!(
                        "Best-effort stage {} degraded for {:?}: {}",
                        stage.name,
                        subject,
                        detail
                    );
                    outputs.push(StageOutput {
                        text: placeholder(subject),
                        item,
                        degraded: true,
                        error: Some(detail),
                    });
                }
            }
        }

        Ok(StageRecord {
            stage: stage.name.clone(),
            outputs,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;
    use crate::providers::MockClient;
    use ponder_core::config::{LlmConfig, RetryConfig};
    use ponder_core::ProviderError;

    fn executor(mock: Arc<MockClient>) -> PipelineExecutor {
        let llm = LlmConfig {
            default_provider: "mock".into(),
            retry: RetryConfig::none(),
            ..LlmConfig::default()
        };
        let client =
            ProviderClient::new(ProviderKind::Mock, &llm).with_backend(ProviderKind::Mock, mock);
        PipelineExecutor::new(Arc::new(client), PipelineConfig::default())
    }

    fn two_stage() -> Pipeline {
        Pipeline::new(
            "echo",
            vec![
                PipelineStage::single("first", |input| format!("first: {}", input.task.input_text))
                    .max_tokens(20),
                PipelineStage::single("second", |input| {
                    format!("second: {}", input.records[0].text())
                })
                .tunable(),
            ],
            |_, records| records.iter().map(|r| r.text()).collect::<Vec<_>>().join(" | "),
        )
    }

    #[tokio::test]
    async fn test_stage_output_feeds_next_prompt() {
        let mock = Arc::new(MockClient::new("m").with_replies(["alpha", "beta"]));
        let outcome = executor(mock.clone())
            .run(&two_stage(), &PipelineTask::new("input"), &CancellationToken::new())
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].prompt, "first: input");
        assert_eq!(requests[1].prompt, "second: alpha");
        assert_eq!(outcome.stage_outputs, vec!["beta".to_string()]);
        assert_eq!(outcome.aggregate, "alpha | beta");
    }

    #[tokio::test]
    async fn test_tunable_overrides_only_tunable_stages() {
        let mock = Arc::new(MockClient::new("m").with_replies(["a", "b"]));
        let mut task = PipelineTask::new("input");
        task.max_tokens = Some(99);
        task.temperature = Some(0.1);
        executor(mock.clone())
            .run(&two_stage(), &task, &CancellationToken::new())
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].params.max_tokens, 20);
        assert_eq!(requests[0].params.temperature, 0.7);
        assert_eq!(requests[1].params.max_tokens, 99);
        assert_eq!(requests[1].params.temperature, 0.1);
    }

    #[tokio::test]
    async fn test_required_failure_names_stage() {
        let mock = Arc::new(
            MockClient::new("m")
                .with_script([Ok("a".to_string()), Err(ProviderError::backend("down"))]),
        );
        let err = executor(mock)
            .run(&two_stage(), &PipelineTask::new("input"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrchestrationError::PipelineStageFailed {
                stage: "second".into(),
                detail: "backend error: down".into()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let mock = Arc::new(MockClient::new("m"));
        let err = executor(mock.clone())
            .run(&two_stage(), &PipelineTask::new(""), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTask(_)));
        assert_eq!(mock.calls(), 0);
    }
}
