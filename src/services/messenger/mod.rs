mod http_impl;
mod mock;

pub use http_impl::HttpMessenger;
pub use mock::MockMessenger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::integration::Integration;

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("integration has no usable access token")]
    MissingCredential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageButton {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectMessage {
    pub text: String,
    #[serde(default)]
    pub buttons: Vec<MessageButton>,
}

/// Outbound side of the messaging provider. Implementations own auth and
/// wire format; callers just hand over the integration row.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn reply_to_comment(
        &self,
        integration: &Integration,
        comment_id: &str,
        text: &str,
    ) -> Result<(), MessengerError>;

    async fn send_direct_message(
        &self,
        integration: &Integration,
        recipient_id: &str,
        message: &DirectMessage,
    ) -> Result<(), MessengerError>;
}
