//! Rule-based text classification refined by one generation call.

use crate::pipeline::{Pipeline, PipelineStage, StageRecord};
use crate::task::PipelineTask;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::LazyLock;

pub const REFINE_STAGE: &str = "refine";

const REFINE_FALLBACK: &str = "LLM refinement failed, using rule-based classification";

static RULES: LazyLock<Vec<(&'static str, Vec<(&'static str, Regex)>)>> = LazyLock::new(|| {
    let table: [(&str, &[&str]); 5] = [
        ("Greeting", &[r"\bhello\b", r"\bhi\b", r"\bhey\b", r"\bgreetings\b"]),
        (
            "Question",
            &[r"\?$", r"\bwhat\b", r"\bhow\b", r"\bwhy\b", r"\bwhen\b", r"\bwhere\b"],
        ),
        (
            "Command",
            &[r"\bdo\b", r"\bexecute\b", r"\brun\b", r"\bperform\b", r"\bcreate\b"],
        ),
        ("Statement", &[r"\bis\b", r"\bare\b", r"\bwas\b", r"\bwere\b"]),
        (
            "Request",
            &[r"\bplease\b", r"\bcould you\b", r"\bwould you\b", r"\bcan you\b"],
        ),
    ];
    table
        .into_iter()
        .map(|(category, patterns)| {
            let compiled: Vec<(&'static str, Regex)> = patterns
                .iter()
                .map(|p| (*p, Regex::new(p).unwrap()))
                .collect();
            (category, compiled)
        })
        .collect()
});

static RE_CLASSIFICATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CLASSIFICATION:[ \t]*(.+)").unwrap());
static RE_REASONING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)REASONING:\s*(.+)").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleClassification {
    pub category: String,
    pub confidence: f64,
    /// Patterns that matched for the winning category.
    pub pattern_matches: Vec<String>,
}

/// Score each category by matched patterns. The first category with the top
/// score wins; confidence is that score over the number of categories that
/// matched at all.
pub fn rule_classify(text: &str) -> RuleClassification {
    let lowered = text.trim().to_lowercase();
    let scored: Vec<(&str, Vec<String>)> = RULES
        .iter()
        .map(|(category, patterns)| {
            let matched = patterns
                .iter()
                .filter(|(_, re)| re.is_match(&lowered))
                .map(|(p, _)| p.to_string())
                .collect();
            (*category, matched)
        })
        .collect();

    let active = scored.iter().filter(|(_, m)| !m.is_empty()).count();
    let best = scored
        .iter()
        .fold(None::<&(&str, Vec<String>)>, |best, cur| match best {
            Some(b) if b.1.len() >= cur.1.len() => Some(b),
            _ => Some(cur),
        });

    match best {
        Some((category, matches)) if active > 0 => RuleClassification {
            category: category.to_string(),
            confidence: matches.len() as f64 / active as f64,
            pattern_matches: matches.clone(),
        },
        _ => RuleClassification {
            category: "Unknown".to_string(),
            confidence: 0.0,
            pattern_matches: Vec::new(),
        },
    }
}

/// Pull `CLASSIFICATION:` and `REASONING:` out of a refinement reply.
pub fn parse_refinement(reply: &str) -> (String, String) {
    let category = RE_CLASSIFICATION
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let reasoning = RE_REASONING
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "No reasoning provided".to_string());
    (category, reasoning)
}

pub fn pipeline() -> Pipeline {
    let refine = PipelineStage::single(REFINE_STAGE, |input| {
        let initial = rule_classify(&input.task.input_text);
        format!(
            "Given the input text: '{}' and an initial rule-based classification of '{}' \
             (confidence: {:.2}), provide a refined classification with reasoning.\n\n\
             Initial pattern matches: {:?}\n\n\
             Your task:\n\
             1. Determine if the initial classification is correct\n\
             2. If not, provide a better classification\n\
             3. Explain your reasoning\n\n\
             Format your response as:\n\
             CLASSIFICATION: [category]\n\
             REASONING: [your explanation]",
            input.task.input_text, initial.category, initial.confidence, initial.pattern_matches
        )
    })
    .max_tokens(100)
    .system("You are a text classification expert.")
    .best_effort(|_| REFINE_FALLBACK.to_string())
    .tunable();

    Pipeline::new("classify", vec![refine], aggregate)
}

fn aggregate(task: &PipelineTask, records: &[StageRecord]) -> String {
    let initial = rule_classify(&task.input_text);
    let refined = records
        .iter()
        .find(|r| r.stage == REFINE_STAGE)
        .and_then(|r| r.outputs.first());

    let (category, reasoning) = match refined {
        Some(out) if !out.degraded => parse_refinement(&out.text),
        _ => (initial.category.clone(), REFINE_FALLBACK.to_string()),
    };

    json!({
        "initial_classification": initial,
        "refined_classification": {
            "category": category,
            "reasoning": reasoning,
        }
    })
    .to_string()
}
