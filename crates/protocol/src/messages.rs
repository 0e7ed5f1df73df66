//! Dialect A: the Messages API.
//!
//! Inbound requests are decoded into [`MessagesRequest`]; replies are
//! synthesized either as the ordered event sequence of a streamed response
//! or as one aggregate [`MessagesResponse`].
//!
//! Event order for one reply:
//!
//! - `message_start`
//! - a text block (`content_block_start`, optional `content_block_delta`,
//!   `content_block_stop`) when there is text or no tool call at all
//! - one `tool_use` block per tool call, in parse order
//! - `message_delta` with the stop reason, then `message_stop`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use toolrelay_core::{Role, ToolCall, ToolDeclaration, Turn};

use crate::content::{MessageContent, normalize};
use crate::prompt::SystemInstruction;
use crate::tags::ParsedReply;

/// Input token count reported in `message_start`. The upstream gives no usage data.
pub const NOMINAL_INPUT_TOKENS: u32 = 100;

// ── Request ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    #[serde(default)]
    pub model: Option<String>,

    pub messages: Vec<InboundMessage>,

    #[serde(default)]
    pub system: Option<SystemInstruction>,

    #[serde(default)]
    pub tools: Vec<MessagesTool>,

    /// Absent means streamed
    #[serde(default)]
    pub stream: Option<bool>,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: Role,

    #[serde(default)]
    pub content: MessageContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesTool {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub input_schema: Option<Box<RawValue>>,
}

impl MessagesRequest {
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(true)
    }

    pub fn system_text(&self) -> String {
        self.system.as_ref().map(SystemInstruction::text).unwrap_or_default()
    }

    pub fn tool_declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .iter()
            .map(|tool| ToolDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.as_ref().map(|raw| raw.get().to_string()),
            })
            .collect()
    }

    /// Every message flattened into a turn, oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.messages
            .iter()
            .map(|m| Turn::new(m.role, normalize(&m.content)))
            .collect()
    }
}

// ── Response model ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
}

impl StopReason {
    pub fn for_reply(reply: &ParsedReply) -> Self {
        if reply.has_tool_calls() { Self::ToolUse } else { Self::EndTurn }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputUsage {
    pub output_tokens: u32,
}

/// Body of `message_start`; also the aggregate (non-streamed) response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    pub stop_reason: StopReason,
    pub stop_sequence: Option<String>,
}

/// One event of a streamed Messages reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    MessageStart { message: MessagesResponse },
    ContentBlockStart { index: usize, content_block: ContentBlock },
    ContentBlockDelta { index: usize, delta: BlockDelta },
    ContentBlockStop { index: usize },
    MessageDelta { delta: MessageDeltaBody, usage: OutputUsage },
    MessageStop,
}

impl MessageEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
        }
    }
}

// ── Synthesis ─────────────────────────────────────────────────────────────

/// A fresh `msg_<nanos>` id.
pub fn new_message_id() -> String {
    format!("msg_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn output_tokens(raw_len: usize) -> u32 {
    u32::try_from(raw_len).unwrap_or(u32::MAX)
}

/// Whether a reply gets a text block: it has text, or it has nothing else.
fn needs_text_block(reply: &ParsedReply) -> bool {
    !reply.text.is_empty() || !reply.has_tool_calls()
}

/// Pushes blocks one at a time; each is started, filled and stopped before
/// the next index is handed out.
struct EventSink {
    events: Vec<MessageEvent>,
    next_index: usize,
}

impl EventSink {
    fn block(&mut self, start: ContentBlock, delta: Option<BlockDelta>) {
        let index = self.next_index;
        self.next_index += 1;
        self.events.push(MessageEvent::ContentBlockStart {
            index,
            content_block: start,
        });
        if let Some(delta) = delta {
            self.events.push(MessageEvent::ContentBlockDelta { index, delta });
        }
        self.events.push(MessageEvent::ContentBlockStop { index });
    }
}

/// The full event sequence for one reply.
///
/// `raw_len` is the character length of the unparsed upstream text and is
/// reported as the output token count.
pub fn synthesize_events(message_id: &str, model: &str, reply: &ParsedReply, raw_len: usize) -> Vec<MessageEvent> {
    let mut sink = EventSink {
        events: Vec::with_capacity(4 + 3 * (reply.tool_calls.len() + 1)),
        next_index: 0,
    };

    sink.events.push(MessageEvent::MessageStart {
        message: MessagesResponse {
            id: message_id.to_string(),
            kind: "message".into(),
            role: Role::Assistant,
            content: Vec::new(),
            model: model.to_string(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage {
                input_tokens: NOMINAL_INPUT_TOKENS,
                output_tokens: 0,
            },
        },
    });

    if needs_text_block(reply) {
        let delta = (!reply.text.is_empty()).then(|| BlockDelta::TextDelta {
            text: reply.text.clone(),
        });
        sink.block(ContentBlock::Text { text: String::new() }, delta);
    }

    for call in &reply.tool_calls {
        sink.block(
            ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: Value::Object(Default::default()),
            },
            Some(BlockDelta::InputJsonDelta {
                partial_json: call.arguments(),
            }),
        );
    }

    sink.events.push(MessageEvent::MessageDelta {
        delta: MessageDeltaBody {
            stop_reason: StopReason::for_reply(reply),
            stop_sequence: None,
        },
        usage: OutputUsage {
            output_tokens: output_tokens(raw_len),
        },
    });
    sink.events.push(MessageEvent::MessageStop);
    sink.events
}

/// The aggregate response for a non-streamed request. Blocks follow the same
/// rules as the streamed form.
pub fn aggregate_response(message_id: &str, model: &str, reply: &ParsedReply, raw_len: usize) -> MessagesResponse {
    let mut content = Vec::with_capacity(reply.tool_calls.len() + 1);
    if needs_text_block(reply) {
        content.push(ContentBlock::Text {
            text: reply.text.clone(),
        });
    }
    content.extend(reply.tool_calls.iter().map(tool_use_block));

    MessagesResponse {
        id: message_id.to_string(),
        kind: "message".into(),
        role: Role::Assistant,
        content,
        model: model.to_string(),
        stop_reason: Some(StopReason::for_reply(reply)),
        stop_sequence: None,
        usage: Usage {
            input_tokens: NOMINAL_INPUT_TOKENS,
            output_tokens: output_tokens(raw_len),
        },
    }
}

fn tool_use_block(call: &ToolCall) -> ContentBlock {
    ContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: call.input.clone(),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────

/// `{"type":"error","error":{"type":..,"message":..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: "error".into(),
            error: ErrorDetail {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }
}
