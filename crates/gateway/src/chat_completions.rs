//! `POST /v1/chat/completions` — the chat-completions dialect.

use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
};
use std::convert::Infallible;
use toolrelay_protocol::chat_completions::{
    ChatRequest, aggregate_response, created_now, new_completion_id, stream_frames,
};
use tracing::info;

use crate::SharedState;
use crate::error::{GatewayError, RelayError, parse_body};
use crate::relay::{RelayInput, relay};

pub async fn chat_completions_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request: ChatRequest = parse_body(&body).map_err(GatewayError::chat_completions)?;
    if request.messages.is_empty() {
        return Err(GatewayError::chat_completions(RelayError::InvalidRequest(
            "messages must not be empty".into(),
        )));
    }

    let model = state.resolve_model(request.model.as_deref());
    info!(
        dialect = "chat_completions",
        model = %model,
        stream = request.stream,
        messages = request.messages.len(),
        tools = request.tools.len(),
        "Inbound request"
    );

    let output = relay(
        &state,
        RelayInput {
            model,
            instruction: request.system_text(),
            tools: request.tool_declarations(),
            turns: request.turns(),
        },
    )
    .await
    .map_err(GatewayError::chat_completions)?;

    let id = new_completion_id();
    let created = created_now();
    if !request.stream {
        return Ok(Json(aggregate_response(&id, created, &output.model, &output.reply)).into_response());
    }

    let frames = stream_frames(&id, created, &output.model, &output.reply);
    let stream = futures::stream::iter(
        frames
            .into_iter()
            .map(|frame| Ok::<_, Infallible>(SseEvent::default().data(frame.data()))),
    );

    Ok(Sse::new(stream).into_response())
}
