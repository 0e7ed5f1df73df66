//! Dialect translation core for toolrelay.
//!
//! The upstream only understands role-tagged plain text. This crate turns
//! either client dialect into that form and the upstream's text back into
//! a dialect-correct reply:
//!
//! 1. [`content`]: flatten message content into text, tool traffic as tags
//! 2. [`prompt`]: teach the upstream the tool tag syntax via the system prompt
//! 3. [`context`]: fit the history into a character budget
//! 4. [`tags`]: recover tool calls from the reply text
//! 5. [`messages`] / [`chat_completions`]: synthesize the client-facing reply
//!
//! Every step is a pure function; nothing here performs I/O.

pub mod chat_completions;
pub mod content;
pub mod context;
pub mod messages;
pub mod prompt;
pub mod tags;

pub use content::{ContentSegment, MessageContent, normalize};
pub use context::{ContextWindowTrimmer, TrimmedContext};
pub use prompt::{SystemInstruction, synthesize_system_prompt};
pub use tags::{ParsedReply, parse_tool_calls};
