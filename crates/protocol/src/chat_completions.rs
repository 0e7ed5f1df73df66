//! Dialect B: the chat-completions API.
//!
//! History translation folds `system`/`developer` messages into the system
//! instruction, turns `tool` messages into user turns carrying a result tag,
//! and renders assistant `tool_calls` as inline call tags. Replies come back
//! as one aggregate [`ChatCompletion`] or as a run of [`ChatChunk`]s closed
//! by a `[DONE]` sentinel.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use toolrelay_core::{Role, ToolCall, ToolDeclaration, Turn};

use crate::content::{MessageContent, normalize, render_tool_call, render_tool_result, result_text};
use crate::tags::ParsedReply;

/// Literal payload of the final stream line.
pub const DONE_SENTINEL: &str = "[DONE]";

// ── Request ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,

    pub messages: Vec<ChatMessage>,

    #[serde(default)]
    pub tools: Vec<ChatTool>,

    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,

    #[serde(default)]
    pub content: MessageContent,

    #[serde(default)]
    pub tool_calls: Vec<InboundToolCall>,

    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundToolCall {
    #[serde(default)]
    pub id: String,

    pub function: InboundFunction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundFunction {
    pub name: String,

    /// JSON text as produced by the client
    #[serde(default)]
    pub arguments: String,
}

impl InboundToolCall {
    /// Arguments decoded as JSON; text that is not JSON is carried as a JSON string.
    pub fn to_tool_call(&self) -> ToolCall {
        let input = if self.function.arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&self.function.arguments)
                .unwrap_or_else(|_| Value::String(self.function.arguments.clone()))
        };
        ToolCall::new(self.id.clone(), self.function.name.clone(), input)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatTool {
    pub function: ChatFunction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatFunction {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: Option<Box<RawValue>>,
}

impl ChatRequest {
    /// System and developer messages joined in order with newlines.
    pub fn system_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, ChatRole::System | ChatRole::Developer))
            .map(|m| normalize(&m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .iter()
            .map(|tool| ToolDeclaration {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool.function.parameters.as_ref().map(|raw| raw.get().to_string()),
            })
            .collect()
    }

    /// The conversation without system messages, flattened into turns.
    pub fn turns(&self) -> Vec<Turn> {
        self.messages
            .iter()
            .filter_map(|m| match m.role {
                ChatRole::System | ChatRole::Developer => None,
                ChatRole::Tool => {
                    let body = match &m.content {
                        MessageContent::Other(value) => result_text(Some(value)),
                        other => normalize(other),
                    };
                    let id = m.tool_call_id.as_deref().unwrap_or_default();
                    Some(Turn::user(render_tool_result(id, &body)))
                }
                ChatRole::Assistant => {
                    let mut text = normalize(&m.content);
                    for call in m.tool_calls.iter().map(InboundToolCall::to_tool_call) {
                        text.push_str(&render_tool_call(&call.name, &call.id, &call.input));
                    }
                    Some(Turn::assistant(text))
                }
                ChatRole::User => Some(Turn::user(normalize(&m.content))),
            })
            .collect()
    }
}

// ── Response model ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
}

impl FinishReason {
    pub fn for_reply(reply: &ParsedReply) -> Self {
        if reply.has_tool_calls() { Self::ToolCalls } else { Self::Stop }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundToolCall {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub function: FunctionCall,
}

impl From<&ToolCall> for OutboundToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: "function".into(),
            function: FunctionCall {
                name: call.name.clone(),
                arguments: call.arguments(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OutboundToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: FinishReason,
    pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub function: FunctionDelta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
    pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// One `data:` line of a streamed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Chunk(ChatChunk),
    Done,
}

impl StreamFrame {
    /// The text that follows `data: ` on the wire.
    pub fn data(&self) -> String {
        match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk).unwrap_or_default(),
            Self::Done => DONE_SENTINEL.to_string(),
        }
    }
}

// ── Synthesis ─────────────────────────────────────────────────────────────

/// A fresh `chatcmpl-<nanos>` id.
pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn char_tokens(text: &str) -> u32 {
    u32::try_from(text.chars().count()).unwrap_or(u32::MAX)
}

/// The aggregate response for a non-streamed request.
pub fn aggregate_response(id: &str, created: i64, model: &str, reply: &ParsedReply) -> ChatCompletion {
    let completion_tokens = char_tokens(&reply.text);
    ChatCompletion {
        id: id.to_string(),
        object: "chat.completion".into(),
        created,
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: Role::Assistant,
                content: (!reply.text.is_empty()).then(|| reply.text.clone()),
                tool_calls: reply.tool_calls.iter().map(OutboundToolCall::from).collect(),
            },
            finish_reason: FinishReason::for_reply(reply),
            logprobs: None,
        }],
        usage: ChatUsage {
            prompt_tokens: 0,
            completion_tokens,
            total_tokens: completion_tokens,
        },
    }
}

/// The chunk sequence for a streamed reply, ending with [`StreamFrame::Done`].
///
/// Text goes out as a single content chunk; each tool call as an
/// introduction chunk (id, name, empty arguments) followed by one chunk
/// with the full argument text.
pub fn stream_frames(id: &str, created: i64, model: &str, reply: &ParsedReply) -> Vec<StreamFrame> {
    let chunk = |delta: ChunkDelta, finish_reason: Option<FinishReason>| {
        StreamFrame::Chunk(ChatChunk {
            id: id.to_string(),
            object: "chat.completion.chunk".into(),
            created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
                logprobs: None,
            }],
        })
    };

    let mut frames = Vec::with_capacity(4 + 2 * reply.tool_calls.len());
    frames.push(chunk(
        ChunkDelta {
            role: Some(Role::Assistant),
            ..Default::default()
        },
        None,
    ));

    if !reply.text.is_empty() {
        frames.push(chunk(
            ChunkDelta {
                content: Some(reply.text.clone()),
                ..Default::default()
            },
            None,
        ));
    }

    for (index, call) in reply.tool_calls.iter().enumerate() {
        frames.push(chunk(
            ChunkDelta {
                tool_calls: vec![ToolCallDelta {
                    index,
                    id: Some(call.id.clone()),
                    kind: Some("function".into()),
                    function: FunctionDelta {
                        name: Some(call.name.clone()),
                        arguments: String::new(),
                    },
                }],
                ..Default::default()
            },
            None,
        ));
        frames.push(chunk(
            ChunkDelta {
                tool_calls: vec![ToolCallDelta {
                    index,
                    id: None,
                    kind: None,
                    function: FunctionDelta {
                        name: None,
                        arguments: call.arguments(),
                    },
                }],
                ..Default::default()
            },
            None,
        ));
    }

    frames.push(chunk(ChunkDelta::default(), Some(FinishReason::for_reply(reply))));
    frames.push(StreamFrame::Done);
    frames
}

/// Current unix time in seconds, the `created` field of responses.
pub fn created_now() -> i64 {
    Utc::now().timestamp()
}

// ── Errors ────────────────────────────────────────────────────────────────

/// `{"error":{"message":..,"type":..,"code":..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub code: String,
}

impl ErrorEnvelope {
    pub fn new(kind: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                kind: kind.into(),
                code: code.into(),
            },
        }
    }
}
