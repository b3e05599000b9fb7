// Integration sink
//
// Outbound call that receives free-form messages while a session is active.
// The sink may answer with text that is relayed back to the chat verbatim.

pub mod payload;
pub mod webhook;

use async_trait::async_trait;

pub use payload::{IntegrationPayload, IntegrationReply};
pub use webhook::{IntegrationConfig, WebhookSink};

/// Sink failures. All of them surface to the user as a retry-later message.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Integration sink timed out after {0} seconds")]
    Timeout(u64),

    #[error("Integration sink returned HTTP {0}")]
    Status(u16),

    #[error("Integration sink transport error: {0}")]
    Transport(String),

    #[error("Integration sink response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait IntegrationSink: Send + Sync {
    /// Deliver one message. `Ok(None)` means the sink accepted it without a reply.
    async fn forward(&self, payload: &IntegrationPayload) -> Result<Option<String>, SinkError>;
}
