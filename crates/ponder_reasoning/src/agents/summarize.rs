use crate::pipeline::{Pipeline, PipelineStage};

pub const SUMMARIZE_STAGE: &str = "summarize";

pub fn pipeline() -> Pipeline {
    let summarize = PipelineStage::single(SUMMARIZE_STAGE, |input| {
        format!(
            "Summarize the following text in {} tokens or less:\n\n{}",
            input.max_tokens, input.task.input_text
        )
    })
    .max_tokens(100)
    .temperature(0.5)
    .system("You are a summarization expert.")
    .tunable();

    Pipeline::new("summarize", vec![summarize], |_, records| {
        records
            .first()
            .map(|r| r.text().trim().to_string())
            .unwrap_or_default()
    })
}
