//! ToolCallTagParser: recovers structured tool calls from upstream prose.
//!
//! Parsing is permissive: a tag whose body does not decode is dropped, but
//! its text is still removed so malformed markup never reaches the client.

use std::sync::LazyLock;

use chrono::Utc;
use regex_lite::Regex;
use serde::Deserialize;
use serde_json::Value;
use toolrelay_core::ToolCall;

static TOOL_CALL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("tool call pattern is valid")
});

/// Upstream text split into tool calls and the prose around them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedReply {
    pub tool_calls: Vec<ToolCall>,

    /// Text with every tag removed, trimmed at both ends
    pub text: String,
}

impl ParsedReply {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Deserialize)]
struct TaggedCall {
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

/// Extract every `<tool_call>` tag from `text`, scanning top to bottom.
pub fn parse_tool_calls(text: &str) -> ParsedReply {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut tool_calls = Vec::new();
    let mut residual = String::with_capacity(text.len());
    let mut last_end = 0;

    for (ordinal, captures) in TOOL_CALL_TAG.captures_iter(text).enumerate() {
        let Some(tag) = captures.get(0) else { continue };
        residual.push_str(&text[last_end..tag.start()]);
        last_end = tag.end();

        let body = captures.get(1).map_or("", |m| m.as_str().trim());
        match serde_json::from_str::<TaggedCall>(body) {
            Ok(call) => {
                let id = call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("toolu_{stamp}_{ordinal}"));
                tool_calls.push(ToolCall::new(id, call.name, call.input.unwrap_or(Value::Null)));
            }
            Err(e) => {
                tracing::debug!(ordinal, error = %e, "Dropping malformed tool call tag");
            }
        }
    }
    residual.push_str(&text[last_end..]);

    ParsedReply {
        tool_calls,
        text: residual.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::render_tool_call;
    use serde_json::json;

    #[test]
    fn prose_then_call() {
        let reply = parse_tool_calls(
            "Let me check.\n<tool_call>\n{\"name\":\"search\",\"input\":{\"q\":\"x\"}}\n</tool_call>",
        );
        assert_eq!(reply.text, "Let me check.");
        assert_eq!(reply.tool_calls.len(), 1);
        let call = &reply.tool_calls[0];
        assert_eq!(call.name, "search");
        assert_eq!(call.input, json!({"q": "x"}));
        assert!(call.id.starts_with("toolu_"));
        assert!(call.id.ends_with("_0"));
    }

    #[test]
    fn plain_text_has_no_calls() {
        let reply = parse_tool_calls("  just words  \n");
        assert!(!reply.has_tool_calls());
        assert_eq!(reply.text, "just words");
    }

    #[test]
    fn explicit_id_is_kept() {
        let reply = parse_tool_calls(r#"<tool_call>{"name":"ls","id":"toolu_abc","input":{}}</tool_call>"#);
        assert_eq!(reply.tool_calls[0].id, "toolu_abc");
        assert_eq!(reply.text, "");
    }

    #[test]
    fn missing_input_defaults_to_empty_object() {
        let reply = parse_tool_calls("<tool_call>{\"name\":\"now\"}</tool_call>");
        assert_eq!(reply.tool_calls[0].input, json!({}));
    }

    #[test]
    fn malformed_tag_is_dropped_but_removed() {
        let text = "A\n<tool_call>\n{\"name\":\"good\",\"input\":{\"a\":1}}\n</tool_call>\nB\n<tool_call>\n{\"name\": broken}\n</tool_call>\nC";
        let reply = parse_tool_calls(text);
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "good");
        assert!(!reply.text.contains("<tool_call>"));
        assert!(!reply.text.contains("</tool_call>"));
        assert_eq!(reply.text, "A\n\nB\n\nC");
    }

    #[test]
    fn tag_without_json_body_is_removed() {
        let reply = parse_tool_calls("before<tool_call>not json at all</tool_call>after");
        assert!(!reply.has_tool_calls());
        assert_eq!(reply.text, "beforeafter");
    }

    #[test]
    fn multiple_calls_keep_order_and_ordinals() {
        let text = "<tool_call>{\"name\":\"first\"}</tool_call>\n<tool_call>{\"name\":\"second\"}</tool_call>";
        let reply = parse_tool_calls(text);
        let names: Vec<&str> = reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(reply.tool_calls[0].id.ends_with("_0"));
        assert!(reply.tool_calls[1].id.ends_with("_1"));
        assert_ne!(reply.tool_calls[0].id, reply.tool_calls[1].id);
    }

    #[test]
    fn nested_braces_in_input() {
        let text = "<tool_call>\n{\"name\":\"write\",\"input\":{\"doc\":{\"title\":\"t\",\"tags\":[\"a\"]}}}\n</tool_call>";
        let reply = parse_tool_calls(text);
        assert_eq!(reply.tool_calls[0].input, json!({"doc": {"title": "t", "tags": ["a"]}}));
    }

    #[test]
    fn normalizer_output_round_trips() {
        let input = json!({"path": "/tmp/x", "recursive": true, "depth": 3});
        let tag = render_tool_call("list_dir", "toolu_42", &input);
        let reply = parse_tool_calls(&format!("Listing now.{tag}"));

        assert_eq!(reply.text, "Listing now.");
        assert_eq!(reply.tool_calls, vec![ToolCall::new("toolu_42", "list_dir", input)]);
    }

    #[test]
    fn unterminated_tag_is_left_alone() {
        let reply = parse_tool_calls("<tool_call>{\"name\":\"x\"}");
        assert!(!reply.has_tool_calls());
        assert_eq!(reply.text, "<tool_call>{\"name\":\"x\"}");
    }
}
