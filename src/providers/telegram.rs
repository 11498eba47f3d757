use crate::core::notify::{DeliveryError, Notifier};
use crate::core::subscription::UserId;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Sends plain-text messages through the Telegram Bot API.
pub struct TelegramNotifier {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("cryptorate/0.1")
            .build()?;
        Ok(TelegramNotifier {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: UserId,
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(name = "TelegramSend", skip(self, text))]
    async fn send(&self, user_id: UserId, text: &str) -> Result<(), DeliveryError> {
        // The token is part of the path, keep it out of error messages
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: user_id,
                text,
            })
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .json::<ApiResponse>()
            .await
            .map_err(|e| DeliveryError::Transient(format!("HTTP {status}: {}", e.without_url())))?;
        debug!(?body, "Received Telegram response");

        if !status.is_success() || !body.ok {
            return Err(DeliveryError::Transient(format!(
                "HTTP {status}: {}",
                body.description.as_deref().unwrap_or("request rejected")
            )));
        }
        Ok(())
    }
}
