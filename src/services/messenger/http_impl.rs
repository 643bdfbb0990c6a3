use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::models::integration::Integration;
use crate::services::messenger::{DirectMessage, Messenger, MessengerError};

/// Messenger backed by the provider's graph-style HTTP API.
#[derive(Clone)]
pub struct HttpMessenger {
    http: Client,
    base_url: String,
}

impl HttpMessenger {
    pub fn new(http: &Client, base_url: &str) -> Self {
        Self {
            http: http.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn token(integration: &Integration) -> Result<&str, MessengerError> {
        integration
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(MessengerError::MissingCredential)
    }

    async fn post(
        &self,
        url: String,
        token: &str,
        payload: serde_json::Value,
    ) -> Result<(), MessengerError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status().as_u16();
        // Keep the provider's error body verbatim; it carries the error code
        // operators search for.
        let message = resp.text().await.unwrap_or_default();
        Err(MessengerError::Api { status, message })
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn reply_to_comment(
        &self,
        integration: &Integration,
        comment_id: &str,
        text: &str,
    ) -> Result<(), MessengerError> {
        let token = Self::token(integration)?;
        let url = format!("{}/{}/replies", self.base_url, comment_id);
        self.post(url, token, json!({ "message": text })).await
    }

    async fn send_direct_message(
        &self,
        integration: &Integration,
        recipient_id: &str,
        message: &DirectMessage,
    ) -> Result<(), MessengerError> {
        let token = Self::token(integration)?;
        let url = format!("{}/me/messages", self.base_url);

        let payload = if message.buttons.is_empty() {
            json!({
                "recipient": { "id": recipient_id },
                "message": { "text": message.text }
            })
        } else {
            let buttons: Vec<serde_json::Value> = message
                .buttons
                .iter()
                .map(|b| {
                    json!({
                        "type": "web_url",
                        "title": b.label,
                        "url": b.url
                    })
                })
                .collect();
            json!({
                "recipient": { "id": recipient_id },
                "message": {
                    "attachment": {
                        "type": "template",
                        "payload": {
                            "template_type": "button",
                            "text": message.text,
                            "buttons": buttons
                        }
                    }
                }
            })
        };

        self.post(url, token, payload).await
    }
}
