//! Multi-step research analysis: four structured extractions from the query,
//! then one synthesis call that sees all of them.

use crate::pipeline::{Pipeline, PipelineStage, StageInput, StageRecord};
use crate::task::PipelineTask;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

pub const ENTITIES_STAGE: &str = "extract-entities";
pub const QUESTIONS_STAGE: &str = "generate-questions";
pub const TIMELINE_STAGE: &str = "create-timeline";
pub const PERSPECTIVES_STAGE: &str = "identify-perspectives";
pub const SYNTHESIS_STAGE: &str = "comprehensive-analysis";

const SYSTEM: &str = "You are a research analysis expert.";

static RE_JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// (stage, instruction, output format) for the extraction steps, in run order.
const EXTRACTIONS: [(&str, &str, &str); 4] = [
    (
        ENTITIES_STAGE,
        "Extract the key entities (people, organizations, locations, concepts) \
         from the following research query",
        "List the entities in JSON format with categories: \
         {'people': [], 'organizations': [], 'locations': [], 'concepts': []}",
    ),
    (
        QUESTIONS_STAGE,
        "Generate 3-5 specific research questions that would help investigate \
         the following query",
        "List the questions in JSON format: {'questions': []}",
    ),
    (
        TIMELINE_STAGE,
        "Create a potential timeline of key events related to the following research query",
        "List the timeline events in JSON format: {'timeline': []}",
    ),
    (
        PERSPECTIVES_STAGE,
        "Identify 2-3 different perspectives or viewpoints on the following research query",
        "List the perspectives in JSON format: {'perspectives': []}",
    ),
];

pub fn pipeline() -> Pipeline {
    let mut stages: Vec<PipelineStage> = EXTRACTIONS
        .iter()
        .map(|&(name, instruction, shape)| {
            PipelineStage::single(name, move |input| {
                format!("{}: '{}'\n\n{}", instruction, input.task.input_text, shape)
            })
            .max_tokens(300)
            .temperature(0.7)
            .system(SYSTEM)
            .tunable()
        })
        .collect();

    stages.push(
        PipelineStage::single(SYNTHESIS_STAGE, synthesis_prompt)
            .max_tokens(600)
            .temperature(0.7)
            .system(SYSTEM)
            .tunable(),
    );

    Pipeline::new("analyze", stages, aggregate)
}

/// Pull the outermost `{...}` out of a reply and parse it. Replies with no
/// parseable object are kept verbatim under `raw`.
pub fn parse_section(text: &str) -> Value {
    RE_JSON_OBJECT
        .find(text)
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
        .unwrap_or_else(|| {
            json!({
                "raw": text.trim(),
                "note": "Failed to parse JSON, returning raw output",
            })
        })
}

fn section(records: &[StageRecord], stage: &str) -> Value {
    records
        .iter()
        .find(|r| r.stage == stage)
        .map(|r| parse_section(r.text()))
        .unwrap_or_else(|| json!({}))
}

fn synthesis_prompt(input: &StageInput<'_>) -> String {
    let [entities, questions, timeline, perspectives] =
        EXTRACTIONS.map(|(stage, _, _)| section(input.records, stage));
    format!(
        "Based on the following research query and extracted information, \
         provide a comprehensive analysis:\n\n\
         QUERY: {}\n\n\
         ENTITIES: {}\n\n\
         QUESTIONS: {}\n\n\
         TIMELINE: {}\n\n\
         PERSPECTIVES: {}\n\n\
         Your analysis should synthesize this information into a coherent narrative \
         that addresses the key aspects of the research query.",
        input.task.input_text, entities, questions, timeline, perspectives
    )
}

fn aggregate(task: &PipelineTask, records: &[StageRecord]) -> String {
    let analysis = records
        .iter()
        .find(|r| r.stage == SYNTHESIS_STAGE)
        .map_or("", |r| r.text());
    json!({
        "query": task.input_text,
        "entities": section(records, ENTITIES_STAGE),
        "questions": section(records, QUESTIONS_STAGE),
        "timeline": section(records, TIMELINE_STAGE),
        "perspectives": section(records, PERSPECTIVES_STAGE),
        "comprehensive_analysis": analysis,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_section_finds_embedded_object() {
        let reply = "Here you go:\n```json\n{\"questions\": [\"Who?\", \"When?\"]}\n```";
        assert_eq!(parse_section(reply), json!({ "questions": ["Who?", "When?"] }));
    }

    #[test]
    fn test_parse_section_keeps_raw_text_on_bad_json() {
        let parsed = parse_section("  {'timeline': [1990]}  ");
        assert_eq!(parsed["raw"], "{'timeline': [1990]}");
        assert_eq!(parsed["note"], "Failed to parse JSON, returning raw output");

        assert_eq!(parse_section("no braces here")["raw"], "no braces here");
    }

    #[test]
    fn test_stage_layout() {
        let pipeline = pipeline();
        let names: Vec<&str> = pipeline.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                ENTITIES_STAGE,
                QUESTIONS_STAGE,
                TIMELINE_STAGE,
                PERSPECTIVES_STAGE,
                SYNTHESIS_STAGE
            ]
        );
        assert!(pipeline.stages.iter().all(|s| s.tunable));
        assert_eq!(pipeline.stages[0].max_tokens, Some(300));
        assert_eq!(pipeline.stages[4].max_tokens, Some(600));
    }

    #[test]
    fn test_aggregate_with_no_records_is_still_json() {
        let value: Value =
            serde_json::from_str(&aggregate(&PipelineTask::new("q"), &[])).unwrap();
        assert_eq!(value["query"], "q");
        assert_eq!(value["entities"], json!({}));
        assert_eq!(value["comprehensive_analysis"], "");
    }
}
