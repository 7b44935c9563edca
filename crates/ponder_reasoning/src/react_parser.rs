//! Parse the Thought/Action/Observation/Answer text protocol.
//!
//! Markers are case-sensitive and tried in priority order:
//! 1. `Answer: <text>`: everything after the first marker, trimmed, non-empty
//! 2. `Action: <Tool>[<input>]`: input runs to the last `]` on that line
//! 3. anything else non-empty is taken verbatim as the final answer

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static RE_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Answer:(.*)").unwrap());

static RE_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Action:[ \t]*([^\[\n]+?)[ \t]*\[(.*)\]").unwrap()
});

static RE_THOUGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Thought:[ \t]*(.+)$").unwrap());

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
    pub tool_name: String,
    pub tool_input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedStep {
    /// Explicit `Answer:` marker.
    Answer(String),
    /// `Action: Tool[input]` to execute before the next generation.
    Action(ActionRequest),
    /// No marker; the trimmed reply stands as the answer.
    Fallback(String),
    /// Blank reply. Not an answer.
    Empty,
}

pub fn parse_step(reply: &str) -> ParsedStep {
    if let Some(answer) = parse_answer(reply) {
        return ParsedStep::Answer(answer);
    }
    if let Some(action) = parse_action(reply) {
        return ParsedStep::Action(action);
    }
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        ParsedStep::Empty
    } else {
        ParsedStep::Fallback(trimmed.to_string())
    }
}

pub fn parse_answer(reply: &str) -> Option<String> {
    let caps = RE_ANSWER.captures(reply)?;
    let text = caps.get(1).map_or("", |m| m.as_str()).trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn parse_action(reply: &str) -> Option<ActionRequest> {
    let caps = RE_ACTION.captures(reply)?;
    let tool_name = caps.get(1).map_or("", |m| m.as_str()).trim();
    if tool_name.is_empty() {
        return None;
    }
    Some(ActionRequest {
        tool_name: tool_name.to_string(),
        tool_input: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
    })
}

/// First `Thought:` line, for the trace.
pub fn parse_thought(reply: &str) -> Option<String> {
    RE_THOUGHT
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}
