//! Credential administration API.
//!
//! - `GET    /api/tokens`            — list (secrets masked)
//! - `POST   /api/tokens`            — add from a token or pasted curl command
//! - `DELETE /api/tokens/{id}`       — remove
//! - `PUT    /api/tokens/{id}`       — rename
//! - `PUT    /api/tokens/{id}/toggle` — enable or disable
//! - `POST   /api/tokens/{id}/test`  — verify against the upstream
//! - `POST   /api/tokens/test-all`   — verify every stored credential

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolrelay_core::{Credential, CredentialError};
use toolrelay_credentials::parse_credential;
use tracing::{info, warn};

use crate::{GatewayState, SharedState};

pub fn tokens_router() -> Router<SharedState> {
    Router::new()
        .route("/api/tokens", get(list_tokens_handler).post(add_token_handler))
        .route("/api/tokens/test-all", post(test_all_handler))
        .route(
            "/api/tokens/{id}",
            put(rename_token_handler).delete(delete_token_handler),
        )
        .route("/api/tokens/{id}/toggle", put(toggle_token_handler))
        .route("/api/tokens/{id}/test", post(test_token_handler))
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TokenDto {
    pub id: i64,
    pub name: String,
    /// Masked secret
    pub token: String,
    pub is_active: bool,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Credential> for TokenDto {
    fn from(c: &Credential) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            token: c.masked(),
            is_active: c.is_active,
            is_valid: c.is_valid,
            last_used: c.last_used,
            created_at: c.created_at,
        }
    }
}

#[derive(Serialize)]
struct TokenListResponse {
    tokens: Vec<TokenDto>,
    total: usize,
}

#[derive(Deserialize)]
struct AddTokenRequest {
    #[serde(default)]
    name: String,
    /// A bare token or a curl command
    input: String,
}

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

#[derive(Deserialize)]
struct ToggleRequest {
    is_active: bool,
}

#[derive(Serialize)]
struct ActionResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct TestResult {
    id: i64,
    name: String,
    is_valid: bool,
    message: String,
}

#[derive(Serialize)]
struct TestAllResponse {
    results: Vec<TestResult>,
    valid: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

fn store_error(e: CredentialError) -> ApiError {
    match e {
        CredentialError::NotFound(id) => api_error(StatusCode::NOT_FOUND, format!("Token {id} not found")),
        CredentialError::Duplicate => api_error(StatusCode::CONFLICT, "Token already stored"),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_tokens_handler(State(state): State<SharedState>) -> Result<Json<TokenListResponse>, ApiError> {
    let all = state.credentials.list().await.map_err(store_error)?;
    let tokens: Vec<TokenDto> = all.iter().map(TokenDto::from).collect();
    Ok(Json(TokenListResponse {
        total: tokens.len(),
        tokens,
    }))
}

async fn add_token_handler(
    State(state): State<SharedState>,
    Json(payload): Json<AddTokenRequest>,
) -> Result<(StatusCode, Json<TokenDto>), ApiError> {
    let secret = parse_credential(&payload.input)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Failed to parse token: {e}")))?;
    let credential = state
        .credentials
        .add(payload.name.trim(), &secret)
        .await
        .map_err(store_error)?;
    info!(id = credential.id, name = %credential.name, "Token added");
    Ok((StatusCode::CREATED, Json(TokenDto::from(&credential))))
}

async fn delete_token_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.credentials.remove(id).await.map_err(store_error)?;
    info!(id, "Token removed");
    Ok(Json(ActionResponse {
        success: true,
        message: format!("Token {id} deleted"),
    }))
}

async fn rename_token_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    state
        .credentials
        .rename(id, payload.name.trim())
        .await
        .map_err(store_error)?;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("Token {id} updated"),
    }))
}

async fn toggle_token_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    state
        .credentials
        .set_active(id, payload.is_active)
        .await
        .map_err(store_error)?;
    info!(id, active = payload.is_active, "Token toggled");
    Ok(Json(ActionResponse {
        success: true,
        message: format!(
            "Token {id} {}",
            if payload.is_active { "enabled" } else { "disabled" }
        ),
    }))
}

async fn test_token_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<TestResult>, ApiError> {
    let credential = state
        .credentials
        .get(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Token {id} not found")))?;
    let result = verify_credential(&state, &credential).await.map_err(store_error)?;
    Ok(Json(result))
}

async fn test_all_handler(State(state): State<SharedState>) -> Result<Json<TestAllResponse>, ApiError> {
    let all = state.credentials.list().await.map_err(store_error)?;
    let mut results = Vec::with_capacity(all.len());
    for credential in &all {
        results.push(verify_credential(&state, credential).await.map_err(store_error)?);
    }
    let valid = results.iter().filter(|r| r.is_valid).count();
    info!(total = results.len(), valid, "Tested all tokens");
    Ok(Json(TestAllResponse { results, valid }))
}

/// Probe the upstream with one credential and record the verdict.
async fn verify_credential(state: &GatewayState, credential: &Credential) -> Result<TestResult, CredentialError> {
    let probe_model = &state.config.upstream.probe_model;
    let (is_valid, message) = match state.provider.verify(&credential.secret, probe_model).await {
        Ok(true) => (true, "Token is valid".to_string()),
        Ok(false) => (false, "No response received".to_string()),
        Err(e) => {
            warn!(id = credential.id, error = %e, "Token verification failed");
            (false, format!("Error: {e}"))
        }
    };
    state.credentials.mark_valid(credential.id, is_valid).await?;
    Ok(TestResult {
        id: credential.id,
        name: credential.name.clone(),
        is_valid,
        message,
    })
}
