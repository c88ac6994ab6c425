pub mod webhook;

pub use webhook::Webhook;

#[cfg(test)]
use mockall::automock;

use crate::{
    config::{WebhookConfig, verbose},
    models::{DeliveryError, ExchangeReply, SessionError, WebhookRequest},
};
use async_trait::async_trait;
use std::sync::Arc;

/// The remote responder a chat exchange is delivered to.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Backend {
    fn name(&self) -> &str;

    /// Deliver one utterance and wait for exactly one reply.
    async fn exchange(&self, request: WebhookRequest) -> Result<ExchangeReply, DeliveryError>;
}

pub type ArcBackend = Arc<dyn Backend + Send + Sync>;

pub fn new_backend(config: &WebhookConfig) -> Result<ArcBackend, SessionError> {
    let webhook = Webhook::try_from(config)?;
    verbose!("  [+] Webhook backend: {}", webhook.endpoint());
    log::debug!("Using webhook backend {}", webhook.endpoint());
    Ok(webhook.into())
}
