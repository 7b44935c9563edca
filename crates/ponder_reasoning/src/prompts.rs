use crate::tool_registry::ToolRegistry;

pub const REACT_STOP_SEQUENCE: &str = "Observation:";

pub struct PromptBuilder;

impl PromptBuilder {
    /// System instruction for the ReAct loop: tool catalogue plus protocol.
    pub fn react_system(preamble: &str, registry: &ToolRegistry) -> String {
        format!(
            "{}\n{}\n\n\
             When answering user, you may use tools to gather info or calculate results.\n\
             Follow this format exactly:\n\
             Thought: <reasoning>\n\
             Action: <ToolName>[<input>]\n\
             Observation: <tool result>\n\
             ...(repeat as needed)...\n\
             Thought: <final reasoning>\n\
             Answer: <final answer>\n\n\
             Only one action at a time, wait for observation before continuing.\n\
             If answer is known or enough info is gathered, output final Answer.",
            preamble,
            registry.catalogue()
        )
    }

    /// Nudge appended when the model replies with nothing usable.
    pub fn empty_reply_observation() -> &'static str {
        "Empty reply. Continue with a Thought and either an Action or an Answer."
    }
}
