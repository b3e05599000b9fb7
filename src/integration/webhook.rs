// HTTP webhook sink
//
// One POST per message, no retries. A failed call is reported once and the
// user is asked to try again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::payload::{IntegrationPayload, IntegrationReply};
use super::{IntegrationSink, SinkError};
use crate::metrics::{SINK_FAILURES_TOTAL, SINK_REQUEST_DURATION_SECONDS};

pub const DEFAULT_INTEGRATION_URL: &str = "http://localhost:5678/webhook/whatsapp";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Integration endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntegrationConfig {
    /// URL to POST messages to
    pub url: String,
    /// Shared secret sent in the payload
    pub api_key: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INTEGRATION_URL.to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl IntegrationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub struct WebhookSink {
    client: reqwest::Client,
    config: IntegrationConfig,
}

impl WebhookSink {
    pub fn new(config: IntegrationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    async fn post(&self, payload: &IntegrationPayload) -> Result<Option<String>, SinkError> {
        let body = payload.clone().with_api_key(&self.config.api_key);
        let response = self
            .client
            .post(&self.config.url)
            .timeout(self.config.timeout())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        parse_reply(&body)
    }

    fn classify(&self, err: reqwest::Error) -> SinkError {
        if err.is_timeout() {
            SinkError::Timeout(self.config.timeout_secs)
        } else {
            SinkError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl IntegrationSink for WebhookSink {
    async fn forward(&self, payload: &IntegrationPayload) -> Result<Option<String>, SinkError> {
        let start = Instant::now();
        let result = self.post(payload).await;
        let elapsed = start.elapsed();
        SINK_REQUEST_DURATION_SECONDS.observe(elapsed.as_secs_f64());

        match &result {
            Ok(reply) => debug!(
                sender = %payload.sender,
                message_id = %payload.message_id,
                has_reply = reply.is_some(),
                "Integration sink - {} ms",
                elapsed.as_millis()
            ),
            Err(e) => {
                SINK_FAILURES_TOTAL.inc();
                warn!(
                    sender = %payload.sender,
                    message_id = %payload.message_id,
                    "Integration sink failed: {}",
                    e
                );
            }
        }
        result
    }
}

/// Empty or non-object bodies are an acknowledgement without a reply
fn parse_reply(body: &[u8]) -> Result<Option<String>, SinkError> {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    if !value.is_object() {
        return Ok(None);
    }
    let reply: IntegrationReply =
        serde_json::from_value(value).map_err(|e| SinkError::Decode(e.to_string()))?;
    Ok(reply.into_text())
}
