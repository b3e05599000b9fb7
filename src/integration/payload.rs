// Wire format for the integration webhook

use serde::{Deserialize, Serialize};

/// Body POSTed to the integration endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPayload {
    /// Raw message text
    pub message: String,
    /// Chat the message arrived in (direct chat id or group key)
    pub from: String,
    /// Sender identity
    #[serde(rename = "phoneNumber")]
    pub sender: String,
    pub message_id: String,
    pub is_group: bool,
    pub group_id: Option<String>,
    /// Shared secret the endpoint checks. Filled in by the sink.
    #[serde(default)]
    pub api_key: String,
}

impl IntegrationPayload {
    pub fn new(
        message: &str,
        chat_id: &str,
        sender: &str,
        message_id: &str,
        is_group: bool,
    ) -> Self {
        Self {
            message: message.to_string(),
            from: chat_id.to_string(),
            sender: sender.to_string(),
            message_id: message_id.to_string(),
            is_group,
            group_id: is_group.then(|| chat_id.to_string()),
            api_key: String::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = api_key.to_string();
        self
    }
}

/// Response body. Anything other than a non-empty `response` string is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationReply {
    #[serde(default)]
    pub response: Option<String>,
}

impl IntegrationReply {
    pub fn into_text(self) -> Option<String> {
        self.response.filter(|text| !text.trim().is_empty())
    }
}
