pub mod agents;
pub mod client;
pub mod domain;
pub mod engine;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod react_parser;
pub mod retry;
pub mod task;
pub mod tool_registry;
pub mod tools;

pub use agents::PipelineKind;
pub use client::ProviderClient;
pub use engine::{FinishReason, ReactEngine, ReactOutcome};
pub use pipeline::{Pipeline, PipelineExecutor, PipelineOutcome};
pub use task::{PipelineTask, ReactTask};
pub use tool_registry::ToolRegistry;
