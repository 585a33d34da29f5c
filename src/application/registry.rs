use crate::domain::tool::{InputSchema, PropertyDefinition, ToolDefinition, ToolResult};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A tool implemented in-process. Executions are synchronous and perform no
/// I/O; anything that needs the network belongs behind a remote connector.
pub trait LocalTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    fn execute(&self, arguments: &Map<String, Value>) -> Result<Value, String>;
}

/// Registry of in-process tools, addressed by bare (unprefixed) names.
/// Built once at startup from an explicit list of constructors and read-only
/// afterwards, so concurrent lookups need no locking.
pub struct LocalToolRegistry {
    tools: HashMap<String, Arc<dyn LocalTool>>,
    order: Vec<String>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AddNumbersTool));
        registry.register(Arc::new(CurrentTimeTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        let name = tool.definition().name;
        debug!(tool = %name, "Registered local tool");
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools.get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Executes a local tool, converting every failure into a structured
    /// `ToolResult` so the caller can feed it back to the model.
    pub fn execute(&self, name: &str, arguments: &Map<String, Value>) -> ToolResult {
        let Some(tool) = self.find(name) else {
            warn!(requested_tool = %name, "Unknown local tool requested");
            return ToolResult::err(name, format!("Unknown local tool: {name}"));
        };

        match tool.execute(arguments) {
            Ok(result) => {
                info!(tool = %name, "Local tool executed");
                ToolResult::ok(name, result)
            }
            Err(message) => {
                warn!(tool = %name, error = %message, "Local tool failed");
                ToolResult::err(name, message)
            }
        }
    }
}

struct AddNumbersTool;

impl LocalTool for AddNumbersTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "add_numbers",
            "Adds a list of numbers and returns the sum.",
            InputSchema::object()
                .with_property(
                    "numbers",
                    PropertyDefinition::new("array", "Numbers to add together."),
                )
                .with_required("numbers"),
        )
    }

    fn execute(&self, arguments: &Map<String, Value>) -> Result<Value, String> {
        let numbers = arguments
            .get("numbers")
            .and_then(Value::as_array)
            .ok_or_else(|| "numbers is required and must be an array".to_string())?;

        let mut sum = 0.0;
        for entry in numbers {
            let number = entry
                .as_f64()
                .ok_or_else(|| format!("not a number: {entry}"))?;
            sum += number;
        }

        Ok(json!({ "sum": sum }))
    }
}

struct CurrentTimeTool;

impl LocalTool for CurrentTimeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "current_time",
            "Returns the current UTC date and time.",
            InputSchema::object(),
        )
    }

    fn execute(&self, _arguments: &Map<String, Value>) -> Result<Value, String> {
        Ok(json!({ "utc": Utc::now().to_rfc3339() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_tools_in_registration_order() {
        let registry = LocalToolRegistry::with_builtins();
        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["add_numbers", "current_time"]);
    }

    #[test]
    fn find_on_unknown_name_returns_none() {
        let registry = LocalToolRegistry::with_builtins();
        assert!(registry.find("no_such_tool").is_none());
        assert!(!registry.exists("no_such_tool"));
        assert!(registry.exists("add_numbers"));
    }

    #[test]
    fn execute_unknown_tool_returns_structured_error() {
        let registry = LocalToolRegistry::with_builtins();
        let result = registry.execute("no_such_tool", &Map::new());
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("no_such_tool"));
    }

    #[test]
    fn add_numbers_sums_arguments() {
        let registry = LocalToolRegistry::with_builtins();
        let mut arguments = Map::new();
        arguments.insert("numbers".to_string(), json!([1, 2, 3.5]));

        let result = registry.execute("add_numbers", &arguments);
        assert!(result.success);
        assert_eq!(result.result, Some(json!({ "sum": 6.5 })));
    }

    #[test]
    fn add_numbers_rejects_missing_argument() {
        let registry = LocalToolRegistry::with_builtins();
        let result = registry.execute("add_numbers", &Map::new());
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("numbers"));
    }
}
