//! Messaging Transport
//!
//! The chat client the router talks to. Every outbound call is
//! fire-and-forget from the router's point of view: failures are logged and
//! never retried.
//!
//! - [`console::ConsoleClient`]: JSON lines on stdout, inbound on stdin
//! - [`recording::RecordingClient`]: captures actions for tests

pub mod console;
pub mod recording;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use console::{ConsoleClient, ConsoleReader};
pub use recording::RecordingClient;

/// One inbound chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport message id, used for quoting replies
    #[serde(default = "new_message_id")]
    pub id: String,
    /// Direct chat id or group key
    pub chat_id: String,
    /// Sender address, possibly with a `@server` suffix
    pub sender: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_group: bool,
    /// Status / broadcast list marker
    #[serde(default)]
    pub is_broadcast: bool,
    /// Echo of a message the bot sent itself
    #[serde(default)]
    pub from_me: bool,
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl InboundMessage {
    /// Message in a one-to-one chat
    pub fn direct(sender: &str, body: &str) -> Self {
        Self {
            id: new_message_id(),
            chat_id: sender.to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            is_group: false,
            is_broadcast: false,
            from_me: false,
        }
    }

    /// Message posted to a group by `sender`
    pub fn group(group_key: &str, sender: &str, body: &str) -> Self {
        Self {
            chat_id: group_key.to_string(),
            is_group: true,
            ..Self::direct(sender, body)
        }
    }

    /// Stable identity of the sender with any `@server` suffix removed
    pub fn identity(&self) -> &str {
        self.sender.split('@').next().unwrap_or(&self.sender)
    }
}

/// Something the bot asked the transport to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    Send {
        to: String,
        text: String,
    },
    Reply {
        to: String,
        text: String,
        quoted_id: String,
    },
    Typing {
        chat_id: String,
        on: bool,
    },
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send(&self, to: &str, text: &str) -> Result<()>;

    async fn reply(&self, to: &str, text: &str, quoted_id: &str) -> Result<()>;

    async fn set_typing(&self, chat_id: &str, on: bool) -> Result<()>;
}
