//! Built-in pipeline agents.

pub mod analyzer;
pub mod classify;
pub mod research;
pub mod summarize;

use crate::pipeline::Pipeline;
use ponder_core::OrchestrationError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Research,
    Summarize,
    Classify,
    Analyze,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 4] = [
        PipelineKind::Research,
        PipelineKind::Summarize,
        PipelineKind::Classify,
        PipelineKind::Analyze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Research => "research",
            PipelineKind::Summarize => "summarize",
            PipelineKind::Classify => "classify",
            PipelineKind::Analyze => "analyze",
        }
    }

    pub fn build(&self) -> Pipeline {
        match self {
            PipelineKind::Research => research::pipeline(),
            PipelineKind::Summarize => summarize::pipeline(),
            PipelineKind::Classify => classify::pipeline(),
            PipelineKind::Analyze => analyzer::pipeline(),
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OrchestrationError::InvalidTask(format!("unknown pipeline '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_build_named_pipelines() {
        for kind in PipelineKind::ALL {
            let pipeline = kind.build();
            assert_eq!(pipeline.name, kind.as_str());
            assert!(!pipeline.stages.is_empty());
        }
        assert_eq!("Research".parse::<PipelineKind>().unwrap(), PipelineKind::Research);
        assert_eq!("analyze".parse::<PipelineKind>().unwrap(), PipelineKind::Analyze);
        assert!("translate".parse::<PipelineKind>().is_err());
    }
}
