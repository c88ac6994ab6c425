#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;

use async_trait::async_trait;
use std::time;

use crate::backend::{ArcBackend, Backend};
use crate::config::constants::WEBHOOK_AUTH_HEADER;
use crate::config::{WebhookConfig, expand_env, user_agent};
use crate::models::{DeliveryError, ExchangeReply, SessionError, WebhookReply, WebhookRequest};

/// Chat automation webhook: one JSON POST per user turn, one JSON reply.
pub struct Webhook {
    alias: String,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<time::Duration>,
    client: reqwest::Client,
}

#[async_trait]
impl Backend for Webhook {
    fn name(&self) -> &str {
        &self.alias
    }

    async fn exchange(&self, request: WebhookRequest) -> Result<ExchangeReply, DeliveryError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("User-Agent", user_agent());

        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        if let Some(api_key) = &self.api_key {
            req = req.header(WEBHOOK_AUTH_HEADER, api_key);
        }

        log::trace!("Sending webhook request: {:?}", request);

        let res = req.json(&request).send().await?;

        let http_code = res.status().as_u16();
        let body = res.text().await?;

        if !(200..300).contains(&http_code) {
            log::error!("Webhook error response ({}): {}", http_code, body);
            return Err(DeliveryError::Status {
                code: http_code,
                body,
            });
        }

        parse_reply(&body)
    }
}

impl From<Webhook> for ArcBackend {
    fn from(value: Webhook) -> Self {
        std::sync::Arc::new(value)
    }
}

impl TryFrom<&WebhookConfig> for Webhook {
    type Error = SessionError;

    fn try_from(value: &WebhookConfig) -> Result<Self, Self::Error> {
        let endpoint = expand_env(&value.endpoint);
        if endpoint.trim().is_empty() {
            return Err(SessionError::Configuration(
                "webhook endpoint is not configured".to_string(),
            ));
        }

        let mut webhook = Webhook::default().with_endpoint(endpoint.trim());

        if let Some(api_key) = value.api_key.as_deref() {
            webhook = webhook.with_api_key(&expand_env(api_key));
        }

        if let Some(timeout) = value.timeout() {
            webhook = webhook.with_timeout(timeout);
        }
        Ok(webhook)
    }
}

impl Webhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout
    }
}

impl Default for Webhook {
    fn default() -> Self {
        Self {
            alias: "webhook".to_string(),
            endpoint: String::new(),
            api_key: None,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }
}

/// Validate a webhook body against `WebhookReply`.
pub(crate) fn parse_reply(body: &str) -> Result<ExchangeReply, DeliveryError> {
    let reply: WebhookReply = serde_json::from_str(body).map_err(|err| {
        log::warn!("Webhook body does not match the reply schema: {}", err);
        DeliveryError::MalformedBody(err.to_string())
    })?;

    match reply.reply_text() {
        Some(text) => Ok(ExchangeReply {
            text: text.to_string(),
            conversation_id: reply.conversation_id().map(|id| id.to_string()),
        }),
        None => Err(DeliveryError::UnrecognizedReply {
            error: reply.error().map(|e| e.to_string()),
        }),
    }
}
