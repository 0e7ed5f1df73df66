//! Tool declarations and structured tool calls.
//!
//! The upstream has no native tool channel. Declarations are taught to it
//! through the system prompt and calls come back as inline tags, so these
//! types only carry data; rendering and parsing live in `toolrelay-protocol`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the client offers to the model. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The input schema exactly as the client sent it (raw JSON text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<String>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: impl Into<String>) -> Self {
        self.input_schema = Some(schema.into());
        self
    }
}

/// A structured tool invocation.
///
/// `id` is never empty and `input` is never null; parsers fill in
/// `toolu_<timestamp>_<ordinal>` and `{}` respectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        let input = if input.is_null() {
            Value::Object(Default::default())
        } else {
            input
        };
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// The input rendered as compact JSON text.
    pub fn arguments(&self) -> String {
        self.input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_input_becomes_empty_object() {
        let call = ToolCall::new("toolu_1", "noop", Value::Null);
        assert_eq!(call.input, json!({}));
        assert_eq!(call.arguments(), "{}");
    }

    #[test]
    fn arguments_are_compact() {
        let call = ToolCall::new("toolu_2", "search", json!({"q": "rust"}));
        assert_eq!(call.arguments(), r#"{"q":"rust"}"#);
    }

    #[test]
    fn declaration_builder() {
        let decl = ToolDeclaration::new("search")
            .with_description("Search the web")
            .with_input_schema(r#"{"type":"object"}"#);
        assert_eq!(decl.description.as_deref(), Some("Search the web"));
        assert_eq!(decl.input_schema.as_deref(), Some(r#"{"type":"object"}"#));
    }
}
