pub mod config;
pub mod error;

pub use config::PonderConfig;
pub use error::{OrchestrationError, ProviderError, ToolError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message in a reasoning conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Observation,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Observation => "observation",
        }
    }

    /// Label used when the conversation is rendered as a plain-text transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Observation => "Observation",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self::new(Role::Observation, content)
    }
}

/// Append-only message log for a single reasoning run.
///
/// The first message is always the system instruction handed to `new`.
/// Messages can be appended and read, never edited or removed.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_instruction)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The system instruction this conversation was opened with.
    pub fn system_instruction(&self) -> &str {
        &self.messages[0].content
    }

    pub fn last(&self) -> &Message {
        // Never empty: `new` seeds the system instruction.
        &self.messages[self.messages.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render every message after the opening instruction as a role-labelled
    /// transcript, ending with an open `Assistant:` turn for the model to fill.
    pub fn render_transcript(&self) -> String {
        let mut out = String::new();
        for msg in &self.messages[1..] {
            out.push_str(msg.role.label());
            out.push_str(": ");
            out.push_str(msg.content.trim_end());
            out.push_str("\n\n");
        }
        out.push_str("Assistant:");
        out
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_starts_with_system_instruction() {
        let conv = Conversation::new("You are a planner.");
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.system_instruction(), "You are a planner.");
    }

    #[test]
    fn test_conversation_append_preserves_order() {
        let mut conv = Conversation::new("sys");
        conv.push(Message::user("q"));
        conv.push(Message::assistant("Action: Calculator[1+1]"));
        conv.push(Message::observation("2"));

        let roles: Vec<Role> = conv.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Observation]
        );
        assert_eq!(conv.last().content, "2");
    }

    #[test]
    fn test_render_transcript_labels_roles() {
        let mut conv = Conversation::new("sys");
        conv.push(Message::user("What is 2+2?"));
        conv.push(Message::system("hint"));
        conv.push(Message::assistant("Action: Calculator[2+2]"));
        conv.push(Message::observation("4"));

        let text = conv.render_transcript();
        assert!(!text.contains("sys\n"));
        assert!(text.starts_with("User: What is 2+2?"));
        assert!(text.contains("System: hint"));
        assert!(text.contains("Observation: 4"));
        assert!(text.ends_with("Assistant:"));
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Message::observation("x")).unwrap();
        assert_eq!(json, r#"{"role":"observation","content":"x"}"#);
    }
}
