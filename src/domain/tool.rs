use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Schema-described capability offered to the model. Built once at
/// registration time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: InputSchema,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: InputSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl InputSchema {
    pub fn object() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, property: PropertyDefinition) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub allowed: Option<Vec<Value>>,
}

impl PropertyDefinition {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            default: None,
            allowed: None,
        }
    }
}

/// One tool invocation requested by the model. Produced by the response
/// parser, consumed exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCallRequest {
    #[serde(alias = "toolName")]
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Outcome of a tool execution. Exactly one of `result`/`error` is set;
/// failures are converted to this shape before leaving the dispatch
/// boundary, so callers never see a transport error type.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub timestamp: i64,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            tool_name: tool_name.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn err(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            tool_name: tool_name.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_and_error_are_mutually_exclusive() {
        let ok = ToolResult::ok("local:add", json!(3));
        assert!(ok.success);
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err = ToolResult::err("rag:search", "boom");
        assert!(!err.success);
        assert!(err.result.is_none());
        assert_eq!(err.error.as_deref(), Some("boom"));
    }

    #[test]
    fn call_request_accepts_tool_name_alias() {
        let parsed: ToolCallRequest =
            serde_json::from_value(json!({"toolName": "rag:search_documents", "arguments": {"query": "x"}}))
                .expect("deserializes");
        assert_eq!(parsed.name, "rag:search_documents");
        assert_eq!(parsed.arguments.get("query"), Some(&json!("x")));
    }

    #[test]
    fn definition_round_trips_wire_casing() {
        let definition = ToolDefinition::new(
            "search_documents",
            "Semantic document search.",
            InputSchema::object()
                .with_property("query", PropertyDefinition::new("string", "Search text."))
                .with_required("query"),
        );
        let value = serde_json::to_value(&definition).expect("serializes");
        assert!(value.get("inputSchema").is_some());
        assert_eq!(value["inputSchema"]["type"], json!("object"));

        let back: ToolDefinition = serde_json::from_value(value).expect("deserializes");
        assert_eq!(back, definition);
    }
}
