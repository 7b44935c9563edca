use crate::tools::CalculatorTool;
use futures_util::FutureExt;
use ponder_core::ToolError;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

// ============================================================================
// ToolHandler trait
// ============================================================================

#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name used for dispatch. Matched case-insensitively.
    fn name(&self) -> &str;

    /// One-line description shown to the model in the tool catalogue.
    fn description(&self) -> &str;

    /// Run the tool on the raw text between the action brackets.
    async fn execute(&self, input: &str) -> Result<String, ToolError>;
}

// ============================================================================
// ToolRegistry
// ============================================================================

/// Read-only once built; share it as `Arc<ToolRegistry>`.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: Vec<Box<dyn ToolHandler>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in tools.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CalculatorTool));
        registry
    }

    /// Register a tool handler. Replaces any existing handler whose name
    /// matches case-insensitively.
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        let key = handler.name().to_lowercase();
        tracing::debug!("Registered tool: {}", handler.name());
        match self.index.get(&key) {
            Some(&slot) => self.handlers[slot] = handler,
            None => {
                self.index.insert(key, self.handlers.len());
                self.handlers.push(handler);
            }
        }
    }

    /// Exact, case-insensitive lookup.
    pub fn resolve(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.index
            .get(&name.trim().to_lowercase())
            .map(|&slot| self.handlers[slot].as_ref())
    }

    /// Invoke a tool and render the result as observation text.
    ///
    /// Never fails: tool errors become `Error: <message>` and unknown names
    /// become `Tool "<name>" not found`.
    pub async fn invoke(&self, name: &str, input: &str) -> String {
        let Some(handler) = self.resolve(name) else {
            tracing::warn!("Unknown tool requested: {}", name);
            return ToolError::NotFound(name.to_string()).to_string();
        };

        match AssertUnwindSafe(handler.execute(input)).catch_unwind().await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Tool {} failed on {:?}: {}", handler.name(), input, e);
                format!("Error: {}", e)
            }
            Err(_) => {
                tracing::warn!("Tool {} panicked on {:?}", handler.name(), input);
                format!("Error: tool {} crashed", handler.name())
            }
        }
    }

    /// `Name: description` lines, in registration order.
    pub fn catalogue(&self) -> String {
        self.handlers
            .iter()
            .map(|h| format!("{}: {}", h.name(), h.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait::async_trait]
    impl ToolHandler for Upper {
        fn name(&self) -> &str {
            "Upper"
        }
        fn description(&self) -> &str {
            "Uppercases text."
        }
        async fn execute(&self, input: &str) -> Result<String, ToolError> {
            if input.is_empty() {
                return Err(ToolError::InvalidInput("nothing to uppercase".into()));
            }
            Ok(input.to_uppercase())
        }
    }

    struct Explodes;

    #[async_trait::async_trait]
    impl ToolHandler for Explodes {
        fn name(&self) -> &str {
            "Explodes"
        }
        fn description(&self) -> &str {
            "Always panics."
        }
        async fn execute(&self, _input: &str) -> Result<String, ToolError> {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn test_case_insensitive_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Upper));
        assert_eq!(registry.invoke("upper", "abc").await, "ABC");
        assert_eq!(registry.invoke("UPPER", "abc").await, "ABC");
        assert!(registry.resolve("Upp").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_observation() {
        let registry = ToolRegistry::with_builtin_tools();
        assert_eq!(
            registry.invoke("Search", "weather").await,
            "Tool \"Search\" not found"
        );
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Upper));
        assert_eq!(registry.invoke("Upper", "").await, "Error: nothing to uppercase");
    }

    #[tokio::test]
    async fn test_panicking_tool_is_contained() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Explodes));
        let obs = registry.invoke("Explodes", "x").await;
        assert!(obs.starts_with("Error:"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::with_builtin_tools();
        registry.register(Box::new(CalculatorTool));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["Calculator"]);
        assert!(registry
            .catalogue()
            .starts_with("Calculator: Performs arithmetic calculations."));
    }
}
