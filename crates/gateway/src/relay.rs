//! The request pipeline shared by both dialects.
//!
//! checkout credential → system prompt → trim → one upstream call → parse tags.

use std::time::Instant;
use toolrelay_core::{ProviderRequest, ToolDeclaration, Turn};
use toolrelay_protocol::{ParsedReply, parse_tool_calls, synthesize_system_prompt};
use tracing::{debug, error, info, warn};

use crate::GatewayState;
use crate::error::RelayError;

/// A request already decoded from either dialect.
#[derive(Debug, Clone)]
pub struct RelayInput {
    pub model: String,
    pub instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub turns: Vec<Turn>,
}

/// The parsed upstream reply.
#[derive(Debug, Clone)]
pub struct RelayOutput {
    pub model: String,
    pub reply: ParsedReply,

    /// Character length of the unparsed upstream text
    pub raw_len: usize,
}

/// Run one request through the upstream.
pub async fn relay(state: &GatewayState, input: RelayInput) -> Result<RelayOutput, RelayError> {
    let credential = state.credentials.checkout().await?.ok_or(RelayError::NoCredential)?;
    debug!(credential_id = credential.id, credential = %credential.name, "Using credential");

    let prompt = synthesize_system_prompt(&input.instruction, &input.tools);
    let trimmed = state.trimmer.trim(&prompt, input.turns);
    let dropped = trimmed.metadata.dropped_over_budget + trimmed.metadata.dropped_leading;
    if dropped > 0 {
        info!(
            dropped_over_budget = trimmed.metadata.dropped_over_budget,
            dropped_leading = trimmed.metadata.dropped_leading,
            used_chars = trimmed.metadata.used_chars,
            budget = trimmed.metadata.budget,
            "History trimmed"
        );
    }

    let started = Instant::now();
    let request = ProviderRequest::new(&input.model, trimmed.turns, &credential.secret);
    let response = match state.provider.complete(request).await {
        Ok(response) => response,
        Err(e) => {
            error!(provider = state.provider.name(), model = %input.model, error = %e, "Upstream call failed");
            if e.is_auth_failure() {
                warn!(credential_id = credential.id, "Upstream rejected credential, marking invalid");
                if let Err(store_err) = state.credentials.mark_valid(credential.id, false).await {
                    warn!(error = %store_err, "Failed to mark credential invalid");
                }
            }
            return Err(e.into());
        }
    };

    let raw_len = response.text.chars().count();
    let reply = parse_tool_calls(&response.text);
    info!(
        model = %input.model,
        elapsed_secs = started.elapsed().as_secs_f64(),
        reply_chars = raw_len,
        tool_calls = reply.tool_calls.len(),
        "Upstream reply received"
    );

    Ok(RelayOutput {
        model: input.model,
        reply,
        raw_len,
    })
}
