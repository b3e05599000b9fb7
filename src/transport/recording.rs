//! In-memory client that records every outbound action.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{MessagingClient, OutboundAction};

#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    actions: Arc<Mutex<Vec<OutboundAction>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail after recording it
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<OutboundAction> {
        self.lock().clone()
    }

    /// Text of every send and reply, in order
    pub fn texts(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|a| match a {
                OutboundAction::Send { text, .. } | OutboundAction::Reply { text, .. } => {
                    Some(text.clone())
                }
                OutboundAction::Typing { .. } => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OutboundAction>> {
        self.actions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, action: OutboundAction) -> Result<()> {
        self.lock().push(action);
        if self.failing.load(Ordering::SeqCst) {
            bail!("recording client set to fail");
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for RecordingClient {
    async fn send(&self, to: &str, text: &str) -> Result<()> {
        self.record(OutboundAction::Send {
            to: to.to_string(),
            text: text.to_string(),
        })
    }

    async fn reply(&self, to: &str, text: &str, quoted_id: &str) -> Result<()> {
        self.record(OutboundAction::Reply {
            to: to.to_string(),
            text: text.to_string(),
            quoted_id: quoted_id.to_string(),
        })
    }

    async fn set_typing(&self, chat_id: &str, on: bool) -> Result<()> {
        self.record(OutboundAction::Typing {
            chat_id: chat_id.to_string(),
            on,
        })
    }
}
