//! ToolPromptSynthesizer: merges the system instruction with a description
//! of the tag syntax the upstream must use to call tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolrelay_core::ToolDeclaration;

use crate::content::ContentSegment;

/// Fixed preamble teaching the upstream the tool invocation format.
pub const TOOL_PREAMBLE: &str = "\n\n# Tools\n\nYou have access to the following tools. When you need to use a tool, output it in this EXACT format:\n\n<tool_call>\n{\"name\": \"tool_name\", \"input\": {\"param\": \"value\"}}\n</tool_call>\n\nAvailable tools:\n\n";

/// A system instruction as clients send it: a string or a list of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemInstruction {
    Text(String),
    Segments(Vec<ContentSegment>),
    Other(Value),
}

impl SystemInstruction {
    /// Plain text of the instruction. Each text segment is followed by a newline;
    /// non-text segments are ignored.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Segments(segments) => segments
                .iter()
                .filter_map(|s| match s {
                    ContentSegment::Text { text } => Some(format!("{text}\n")),
                    _ => None,
                })
                .collect(),
            Self::Other(_) => String::new(),
        }
    }
}

/// Build the combined system prompt.
///
/// Without tools the result is exactly `instruction`. With tools, the
/// preamble and one section per declaration follow, in declaration order.
pub fn synthesize_system_prompt(instruction: &str, tools: &[ToolDeclaration]) -> String {
    let mut prompt = instruction.to_string();
    if tools.is_empty() {
        return prompt;
    }

    prompt.push_str(TOOL_PREAMBLE);
    for tool in tools {
        prompt.push_str("## ");
        prompt.push_str(&tool.name);
        prompt.push('\n');
        if let Some(description) = tool.description.as_deref().filter(|d| !d.is_empty()) {
            prompt.push_str(description);
            prompt.push('\n');
        }
        if let Some(schema) = tool.input_schema.as_deref().filter(|s| !s.is_empty()) {
            prompt.push_str("Input schema: ");
            prompt.push_str(schema);
            prompt.push('\n');
        }
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_tools_returns_instruction_unchanged() {
        assert_eq!(synthesize_system_prompt("Be terse.", &[]), "Be terse.");
        assert_eq!(synthesize_system_prompt("", &[]), "");
    }

    #[test]
    fn tools_append_preamble_and_sections() {
        let tools = vec![
            ToolDeclaration::new("search")
                .with_description("Search the web")
                .with_input_schema(r#"{"type":"object","properties":{"q":{"type":"string"}}}"#),
            ToolDeclaration::new("now"),
        ];
        let prompt = synthesize_system_prompt("Be terse.", &tools);

        assert!(prompt.starts_with("Be terse.\n\n# Tools\n"));
        assert!(prompt.contains("<tool_call>\n{\"name\": \"tool_name\""));
        assert!(prompt.ends_with(
            "## search\nSearch the web\nInput schema: {\"type\":\"object\",\"properties\":{\"q\":{\"type\":\"string\"}}}\n\n## now\n\n"
        ));
    }

    #[test]
    fn declaration_order_is_kept_without_dedup() {
        let tools = vec![ToolDeclaration::new("b"), ToolDeclaration::new("a"), ToolDeclaration::new("b")];
        let prompt = synthesize_system_prompt("", &tools);
        let headings: Vec<&str> = prompt.lines().filter(|l| l.starts_with("## ")).collect();
        assert_eq!(headings, vec!["## b", "## a", "## b"]);
    }

    #[test]
    fn segment_instruction_joins_text_with_newlines() {
        let instruction: SystemInstruction = serde_json::from_value(json!([
            {"type": "text", "text": "You are helpful."},
            {"type": "text", "text": "Answer in English."}
        ]))
        .unwrap();
        assert_eq!(instruction.text(), "You are helpful.\nAnswer in English.\n");
    }

    #[test]
    fn string_instruction_is_verbatim() {
        let instruction: SystemInstruction = serde_json::from_value(json!("hi")).unwrap();
        assert_eq!(instruction.text(), "hi");
    }

    #[test]
    fn odd_instruction_shapes_are_empty() {
        let instruction: SystemInstruction = serde_json::from_value(json!(17)).unwrap();
        assert_eq!(instruction.text(), "");
    }
}
