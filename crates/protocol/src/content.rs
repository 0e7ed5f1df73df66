//! ContentNormalizer: flattens message content into one plain-text string.
//!
//! Content arrives either as a bare string or as an ordered list of typed
//! segments. Tool invocations and tool results are embedded inline as tags
//! so a text-only upstream still sees the whole exchange:
//!
//! ```text
//! <tool_call>
//! {"name":"search","id":"toolu_1","input":{"q":"x"}}
//! </tool_call>
//!
//! <tool_result id="toolu_1">
//! ...
//! </tool_result>
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opening marker of a tool invocation tag.
pub const TOOL_CALL_OPEN: &str = "<tool_call>";
/// Closing marker of a tool invocation tag.
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";

/// The content of one inbound message.
///
/// Anything that is neither a string nor a segment list decodes as
/// [`MessageContent::Other`] and normalizes to empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Segments(Vec<ContentSegment>),
    Other(Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Other(Value::Null)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One typed segment of a content list, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
    },
    /// Images, documents and other segment kinds carry no text.
    #[serde(other)]
    Unsupported,
}

/// Flatten message content into the text sent upstream. Never fails.
pub fn normalize(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Segments(segments) => {
            let mut out = String::new();
            for segment in segments {
                match segment {
                    ContentSegment::Text { text } => out.push_str(text),
                    ContentSegment::ToolUse { id, name, input } => {
                        out.push_str(&render_tool_call(name, id, input));
                    }
                    ContentSegment::ToolResult {
                        tool_use_id,
                        content,
                    } => {
                        out.push_str(&render_tool_result(tool_use_id, &result_text(content.as_ref())));
                    }
                    ContentSegment::Unsupported => {}
                }
            }
            out
        }
        MessageContent::Other(_) => String::new(),
    }
}

/// Result content as tag body: JSON strings are decoded, anything else is
/// carried as raw JSON text.
pub fn result_text(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[derive(Serialize)]
struct TaggedCall<'a> {
    name: &'a str,
    id: &'a str,
    input: &'a Value,
}

/// Render a tool invocation tag. Keys are emitted as `name`, `id`, `input`.
pub fn render_tool_call(name: &str, id: &str, input: &Value) -> String {
    let empty = Value::Object(Default::default());
    let input = if input.is_null() { &empty } else { input };
    let body = serde_json::to_string(&TaggedCall { name, id, input })
        .unwrap_or_else(|_| String::from("{}"));
    format!("\n{TOOL_CALL_OPEN}\n{body}\n{TOOL_CALL_CLOSE}\n")
}

/// Render a tool result tag carrying the originating call id.
pub fn render_tool_result(id: &str, body: &str) -> String {
    format!("\n<tool_result id=\"{id}\">\n{body}\n</tool_result>\n")
}
