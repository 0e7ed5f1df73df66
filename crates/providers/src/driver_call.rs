//! Driver-call provider: one POST to the upstream `drivers/call` endpoint.
//!
//! The upstream always answers as a stream of newline-delimited JSON
//! objects (`{"type":"text","text":"..."}`). The provider drains that
//! stream completely and hands back the concatenated text; nothing is
//! forwarded before the upstream is done.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use toolrelay_config::UpstreamConfig;
use toolrelay_core::error::ProviderError;
use toolrelay_core::provider::*;
use toolrelay_core::Turn;
use tracing::{debug, trace, warn};

use crate::router::DriverTable;

pub struct DriverCallProvider {
    endpoint: String,
    origin: String,
    referer: String,
    drivers: DriverTable,
    client: reqwest::Client,
}

impl DriverCallProvider {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            origin: config.origin.clone(),
            referer: config.referer.clone(),
            drivers: DriverTable::from_config(config),
            client,
        })
    }

    /// Point the provider at a different endpoint (tests, self-hosted upstreams).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.drivers
    }

    fn build_body<'a>(&self, request: &'a ProviderRequest) -> CallBody<'a> {
        let route = self.drivers.resolve(&request.model);
        CallBody {
            interface: route.interface,
            driver: route.driver,
            test_mode: false,
            method: route.method,
            args: CallArgs {
                messages: &request.turns,
                model: &request.model,
                stream: true,
            },
            auth_token: &request.credential,
        }
    }
}

#[async_trait]
impl Provider for DriverCallProvider {
    fn name(&self) -> &str {
        "driver-call"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = serde_json::to_string(&self.build_body(&request))
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to encode request: {e}")))?;

        debug!(
            model = %request.model,
            turns = request.turns.len(),
            "Sending driver call"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "*/*")
            .header("content-type", "text/plain;actually=json")
            .header("origin", &self.origin)
            .header("referer", &self.referer)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Upstream rejected credential");
            return Err(ProviderError::AuthenticationFailed(error_body));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Upstream returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut reply = ReplyAccumulator::default();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::StreamInterrupted(e.to_string())
                }
            })?;

            buffer.extend_from_slice(&bytes);

            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                reply.push_bytes(&line);
            }
        }
        reply.push_bytes(&buffer);

        let text = reply.finish()?;
        debug!(chars = text.chars().count(), "Driver call complete");

        Ok(ProviderResponse {
            text,
            model: request.model,
        })
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CallBody<'a> {
    interface: String,
    driver: String,
    test_mode: bool,
    method: String,
    args: CallArgs<'a>,
    auth_token: &'a str,
}

#[derive(Serialize)]
struct CallArgs<'a> {
    messages: &'a [Turn],
    model: &'a str,
    stream: bool,
}

/// One line of the upstream's NDJSON stream.
#[derive(Deserialize)]
struct StreamLine {
    #[serde(default)]
    text: Option<String>,

    #[serde(default)]
    success: Option<bool>,

    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Collects text fragments and remembers an in-stream failure report.
#[derive(Debug, Default)]
struct ReplyAccumulator {
    text: String,
    failure: Option<String>,
}

impl ReplyAccumulator {
    /// Decode one complete raw line; lines that are not UTF-8 are skipped.
    fn push_bytes(&mut self, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(line) => self.push_line(line.trim()),
            Err(e) => warn!(error = %e, bytes = raw.len(), "Skipping non-UTF-8 stream line"),
        }
    }

    fn push_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<StreamLine>(line) {
            Ok(StreamLine { text: Some(text), .. }) if !text.is_empty() => self.text.push_str(&text),
            Ok(StreamLine { success, error, .. }) => {
                if success == Some(false) || error.is_some() {
                    self.failure.get_or_insert_with(|| line.to_string());
                }
            }
            Err(_) => trace!(line, "Skipping non-JSON stream line"),
        }
    }

    fn finish(self) -> Result<String, ProviderError> {
        match self.failure {
            Some(report) if self.text.is_empty() => {
                warn!(body = %report, "Upstream reported failure in stream");
                Err(ProviderError::ApiError {
                    status_code: 200,
                    message: report,
                })
            }
            _ => Ok(self.text),
        }
    }
}
