use crate::pipeline::{Pipeline, PipelineStage, StageRecord};
use crate::task::PipelineTask;
use regex::Regex;
use std::sync::LazyLock;

pub const EXTRACT_STAGE: &str = "extract-topics";
pub const ANALYZE_STAGE: &str = "analyze-topic";

static RE_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]+|\d+[.)])\s*").unwrap());

/// Topic extraction, one analysis per topic, then an ordered report.
pub fn pipeline() -> Pipeline {
    let extract = PipelineStage::single(EXTRACT_STAGE, |input| {
        format!(
            "Extract 3-5 key topics from the following research query. \
             Return ONLY a comma-separated list of topics, \
             with no numbering or additional text.\n\n\
             Research query: {}",
            input.task.input_text
        )
    })
    .max_tokens(60)
    .system("You are a research assistant.");

    let analyze = PipelineStage::fan_out(
        ANALYZE_STAGE,
        |input| {
            input
                .records
                .first()
                .map(|r| parse_topics(r.text()))
                .unwrap_or_default()
        },
        |_, topic| format!("Provide a detailed analysis on the following topic:\n\n{}", topic),
    )
    .max_tokens(150)
    .system("You are a research assistant.")
    .best_effort(|topic| format!("Could not analyze topic: {}", topic))
    .tunable();

    Pipeline::new("research", vec![extract, analyze], aggregate)
}

/// Split a model-produced topic list on commas and newlines, dropping list
/// markers and blanks.
pub fn parse_topics(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(|t| RE_LIST_MARKER.replace(t.trim(), "").trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn aggregate(_task: &PipelineTask, records: &[StageRecord]) -> String {
    let Some(analyses) = records.iter().find(|r| r.stage == ANALYZE_STAGE) else {
        return String::new();
    };
    analyses
        .outputs
        .iter()
        .enumerate()
        .map(|(i, out)| {
            format!(
                "Topic {}: {}\n{}",
                i + 1,
                out.item.as_deref().unwrap_or_default(),
                out.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
