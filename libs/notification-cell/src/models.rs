use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An email-worthy message assembled by a domain cell: a recipient, a
/// template name understood by the mail relay, and a flat key-value
/// payload for template rendering. Rendering itself happens downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationMessage {
    pub recipient: String,
    pub template: String,
    pub fields: BTreeMap<String, String>,
}

impl NotificationMessage {
    pub fn new(recipient: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            template: template.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field_opt(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.fields.insert(key.into(), value.into());
        }
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Mail relay not configured")]
    NotConfigured,

    #[error("Mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail relay error: {message}")]
    RelayError { message: String },
}
