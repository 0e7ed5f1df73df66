//! Provider trait — the abstraction over the upstream text service.
//!
//! The upstream accepts a list of role-tagged plain-text turns and answers
//! with plain text. There is no tool channel and no usage accounting; the
//! gateway reconstructs both on its side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Turn;

/// The upstream call shape a model resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRoute {
    pub interface: String,
    pub driver: String,
    pub method: String,
}

/// One upstream call.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// The model id as the client asked for it
    pub model: String,

    /// Already trimmed turns; a system pseudo-turn may lead
    pub turns: Vec<Turn>,

    /// Bearer credential to authenticate the call with
    pub credential: String,
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, turns: Vec<Turn>, credential: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            turns,
            credential: credential.into(),
        }
    }
}

/// The fully drained upstream reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Concatenated text of every streamed fragment
    pub text: String,

    /// Which model answered
    pub model: String,
}

/// The core Provider trait.
///
/// `complete()` returns only after the upstream's own event stream has been
/// fully drained.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and wait for the complete reply.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Probe whether a credential is accepted by sending a one-word prompt.
    async fn verify(&self, credential: &str, model: &str) -> std::result::Result<bool, ProviderError> {
        let response = self
            .complete(ProviderRequest::new(model, vec![Turn::user("Hi")], credential))
            .await?;
        Ok(!response.text.is_empty())
    }
}
