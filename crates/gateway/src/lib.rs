//! HTTP gateway for toolrelay.
//!
//! Routes:
//!
//! - `POST /v1/messages`, `POST /messages` — Messages dialect (SSE by default)
//! - `POST /v1/chat/completions`          — chat-completions dialect
//! - `GET  /v1/models`                    — configured model list
//! - `GET  /health`                       — liveness
//! - `/api/tokens/...`                    — credential administration
//!
//! Built on Axum. Every request is independent; the only shared mutable
//! state is the credential store.

pub mod chat_completions;
pub mod error;
pub mod messages;
pub mod relay;
pub mod tokens;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use toolrelay_config::AppConfig;
use toolrelay_core::{CredentialStore, Provider};
use toolrelay_protocol::ContextWindowTrimmer;

/// Unix time reported as `created` for every listed model.
const MODEL_CREATED: i64 = 1_700_000_000;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub credentials: Arc<dyn CredentialStore>,
    pub trimmer: ContextWindowTrimmer,
}

impl GatewayState {
    pub fn new(config: AppConfig, provider: Arc<dyn Provider>, credentials: Arc<dyn CredentialStore>) -> Self {
        let trimmer = ContextWindowTrimmer::new(config.context.max_chars);
        Self {
            config,
            provider,
            credentials,
            trimmer,
        }
    }

    /// The requested model, or the configured default when absent or blank.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => self.config.upstream.default_model.clone(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.gateway.max_body_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/messages", post(messages::messages_handler))
        .route("/messages", post(messages::messages_handler))
        .route("/v1/chat/completions", post(chat_completions::chat_completions_handler))
        .merge(tokens::tokens_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server with the upstream and credential store
/// named in `config`.
pub async fn start(config: AppConfig) -> toolrelay_core::Result<()> {
    let provider = Arc::new(toolrelay_providers::DriverCallProvider::new(&config.upstream)?);
    let credentials = toolrelay_credentials::open_store(
        &config.credentials.backend,
        &config.credentials.resolved_db_path(),
    )
    .await?;
    serve(Arc::new(GatewayState::new(config, provider, credentials))).await
}

/// Serve an already assembled state until the listener fails.
pub async fn serve(state: SharedState) -> toolrelay_core::Result<()> {
    let addr = state.config.bind_addr();
    info!(
        addr = %addr,
        upstream = %state.config.upstream.endpoint,
        credentials = state.credentials.name(),
        budget = state.trimmer.budget(),
        "Gateway starting"
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

#[derive(Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
}

async fn models_handler(State(state): State<SharedState>) -> Json<ModelList> {
    let data = state
        .config
        .models
        .iter()
        .map(|id| ModelEntry {
            id: id.clone(),
            object: "model",
            created: MODEL_CREATED,
            owned_by: toolrelay_providers::owned_by(id),
        })
        .collect();
    Json(ModelList { object: "list", data })
}
