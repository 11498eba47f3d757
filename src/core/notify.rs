//! Outbound message delivery

use crate::core::subscription::UserId;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery failed: {0}")]
    Transient(String),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: UserId, text: &str) -> Result<(), DeliveryError>;
}
