//! `POST /v1/messages` — the Messages dialect.

use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
};
use std::convert::Infallible;
use toolrelay_protocol::messages::{MessagesRequest, aggregate_response, new_message_id, synthesize_events};
use tracing::info;

use crate::SharedState;
use crate::error::{GatewayError, RelayError, parse_body};
use crate::relay::{RelayInput, relay};

pub async fn messages_handler(State(state): State<SharedState>, body: Bytes) -> Result<Response, GatewayError> {
    let request: MessagesRequest = parse_body(&body).map_err(GatewayError::messages)?;
    if request.messages.is_empty() {
        return Err(GatewayError::messages(RelayError::InvalidRequest(
            "messages must not be empty".into(),
        )));
    }

    let model = state.resolve_model(request.model.as_deref());
    let stream = request.wants_stream();
    info!(
        dialect = "messages",
        model = %model,
        stream,
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
    .map_err(GatewayError::messages)?;

    let message_id = new_message_id();
    if !stream {
        let response = aggregate_response(&message_id, &output.model, &output.reply, output.raw_len);
        return Ok(Json(response).into_response());
    }

    let events = synthesize_events(&message_id, &output.model, &output.reply, output.raw_len);
    let stream = futures::stream::iter(events.into_iter().map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().event(event.event_type()).data(data))
    }));

    Ok(Sse::new(stream).into_response())
}

#[cfg(test)]
mod tests {
    use crate::build_router;
    use crate::test_support::*;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use toolrelay_core::{ProviderError, Role};
    use tower::ServiceExt;

    /// `(event name, data)` pairs from an SSE body.
    fn sse_events(body: &str) -> Vec<(String, serde_json::Value)> {
        body.split("\n\n")
            .filter(|frame| !frame.trim().is_empty())
            .map(|frame| {
                let mut name = String::new();
                let mut data = String::new();
                for line in frame.lines() {
                    if let Some(v) = line.strip_prefix("event:") {
                        name = v.trim().to_string();
                    } else if let Some(v) = line.strip_prefix("data:") {
                        data = v.trim().to_string();
                    }
                }
                (name, serde_json::from_str(&data).unwrap())
            })
            .collect()
    }

    #[tokio::test]
    async fn streams_events_by_default() {
        let provider = Arc::new(ScriptedProvider::replying("Hello there"));
        let app = build_router(state_with(provider).await);

        let req = post_json(
            "/v1/messages",
            r#"{"model":"claude-sonnet-4-5","messages":[{"role":"user","content":"hi"}]}"#,
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let events = sse_events(&body_string(response).await);
        let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(events[0].1["message"]["model"], "claude-sonnet-4-5");
        assert_eq!(events[2].1["delta"]["text"], "Hello there");
        assert_eq!(events[4].1["delta"]["stop_reason"], "end_turn");
        assert_eq!(events[4].1["usage"]["output_tokens"], 11);
    }

    #[tokio::test]
    async fn tool_calls_become_tool_use_blocks() {
        let provider = Arc::new(ScriptedProvider::replying(
            "Let me check.\n<tool_call>\n{\"name\":\"search\",\"id\":\"toolu_1\",\"input\":{\"q\":\"x\"}}\n</tool_call>",
        ));
        let app = build_router(state_with(provider).await);

        let req = post_json(
            "/v1/messages",
            r#"{"messages":[{"role":"user","content":"find x"}],
                "tools":[{"name":"search","description":"Search","input_schema":{"type":"object"}}]}"#,
        );
        let events = sse_events(&body_string(app.oneshot(req).await.unwrap()).await);

        let tool_start = events
            .iter()
            .find(|(n, d)| n == "content_block_start" && d["content_block"]["type"] == "tool_use")
            .unwrap();
        assert_eq!(tool_start.1["index"], 1);
        assert_eq!(tool_start.1["content_block"]["name"], "search");
        assert_eq!(tool_start.1["content_block"]["id"], "toolu_1");

        let input_delta = events
            .iter()
            .find(|(_, d)| d["delta"]["type"] == "input_json_delta")
            .unwrap();
        assert_eq!(input_delta.1["delta"]["partial_json"], r#"{"q":"x"}"#);

        let delta = events.iter().find(|(n, _)| n == "message_delta").unwrap();
        assert_eq!(delta.1["delta"]["stop_reason"], "tool_use");
    }

    #[tokio::test]
    async fn upstream_sees_prompt_and_tagged_history() {
        let provider = Arc::new(ScriptedProvider::replying("done"));
        let app = build_router(state_with(provider.clone()).await);

        let req = post_json(
            "/messages",
            r#"{"system":"Be brief.","stream":false,
                "tools":[{"name":"search","input_schema":{"type":"object"}}],
                "messages":[
                  {"role":"assistant","content":"stray"},
                  {"role":"user","content":"find x"},
                  {"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"search","input":{"q":"x"}}]},
                  {"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"found"}]}
                ]}"#,
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = provider.seen.lock().unwrap();
        let turns = &seen[0].turns;
        assert_eq!(turns[0].role, Role::System);
        assert!(turns[0].text.starts_with("Be brief."));
        assert!(turns[0].text.contains("## search"));
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].text, "find x");
        assert!(turns[2].text.contains("<tool_call>"));
        assert!(turns[3].text.contains("<tool_result id=\"t1\">"));
        assert_eq!(turns.len(), 4);
        assert_eq!(seen[0].credential, "eyJsecret");
        assert_eq!(seen[0].model, "claude-opus-4-5");
    }

    #[tokio::test]
    async fn non_streaming_returns_aggregate() {
        let provider = Arc::new(ScriptedProvider::replying(
            "<tool_call>{\"name\":\"ls\",\"id\":\"a\",\"input\":{}}</tool_call>",
        ));
        let app = build_router(state_with(provider).await);

        let req = post_json(
            "/v1/messages",
            r#"{"stream":false,"messages":[{"role":"user","content":"list"}]}"#,
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["type"], "message");
        assert_eq!(body["role"], "assistant");
        assert_eq!(body["stop_reason"], "tool_use");
        assert_eq!(body["content"][0]["type"], "text");
        assert_eq!(body["content"][0]["text"], "");
        assert_eq!(body["content"][1]["type"], "tool_use");
        assert_eq!(body["content"][1]["name"], "ls");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_without_upstream_call() {
        let provider = Arc::new(ScriptedProvider::replying("never"));
        let app = build_router(state_with(provider.clone()).await);

        let response = app.oneshot(post_json("/v1/messages", "{oops")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_messages_rejected() {
        let provider = Arc::new(ScriptedProvider::replying("never"));
        let app = build_router(state_with(provider).await);

        let response = app
            .oneshot(post_json("/v1/messages", r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_credential_is_authentication_error() {
        let provider = Arc::new(ScriptedProvider::replying("never"));
        let app = build_router(state_without_credentials(provider));

        let response = app
            .oneshot(post_json(
                "/v1/messages",
                r#"{"messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "authentication_error");
    }

    #[tokio::test]
    async fn upstream_rejection_invalidates_credential() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::AuthenticationFailed(
            "token expired".into(),
        )));
        let state = state_with(provider).await;
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_json(
                "/v1/messages",
                r#"{"messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "api_error");
        assert!(body["error"]["message"].as_str().unwrap().contains("token expired"));

        let all = state.credentials.list().await.unwrap();
        assert!(!all[0].is_valid);
    }
}
