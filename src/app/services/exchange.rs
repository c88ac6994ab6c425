#[cfg(test)]
#[path = "exchange_test.rs"]
mod tests;

use serde_json::{Map, Value};

use crate::backend::ArcBackend;
use crate::models::{
    ChatMessage, DeliveryError, NewMessage, SessionContext, SessionError, WebhookRequest,
    mint_conversation_id,
};
use crate::storage::ArcStore;

/// One user utterance, detached from the surface that produced it so it can
/// be moved into a worker task.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRequest {
    text: String,
    user_id: Option<String>,
    conversation_id: Option<String>,
    marketing_plan_id: Option<String>,
    context: Map<String, Value>,
}

impl ExchangeRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: None,
            conversation_id: None,
            marketing_plan_id: None,
            context: Map::new(),
        }
    }

    /// Take user, plan and context payload from the mounting surface.
    pub fn with_session(mut self, session: &SessionContext) -> Self {
        self.user_id = session.user_id().map(|s| s.to_string());
        self.marketing_plan_id = session.marketing_plan_id().map(|s| s.to_string());
        self.context = session.to_payload();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id.filter(|id| !id.is_empty());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }
}

#[derive(Debug)]
pub struct AssistantReply {
    pub text: String,
    /// `None` when the reply could not be persisted.
    pub message: Option<ChatMessage>,
}

/// Result of an exchange whose preconditions held.
#[derive(Debug)]
pub struct ExchangeOutcome {
    /// Id every turn of this exchange was written with.
    pub conversation_id: String,
    /// `None` when the user turn could not be persisted.
    pub user_message: Option<ChatMessage>,
    pub reply: Result<AssistantReply, DeliveryError>,
}

#[derive(Clone)]
pub struct ExchangeService {
    store: ArcStore,
    backend: ArcBackend,
}

impl ExchangeService {
    pub fn new(store: ArcStore, backend: ArcBackend) -> Self {
        Self { store, backend }
    }

    /// Persist the user turn, deliver it, persist the reply.
    ///
    /// Only a missing user is an error; persistence failures are logged and
    /// delivery failures are reported in `ExchangeOutcome::reply`.
    pub async fn send(&self, request: ExchangeRequest) -> Result<ExchangeOutcome, SessionError> {
        let user_id = request
            .user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                SessionError::Configuration("a user id is required to chat".to_string())
            })?;

        let conversation_id = match request.conversation_id {
            Some(id) => id,
            None => {
                let id = mint_conversation_id();
                log::info!("Starting conversation {} for user {}", id, user_id);
                id
            }
        };

        let user_message = self
            .persist(
                NewMessage::user(&user_id, &request.text)
                    .with_conversation_id(&conversation_id)
                    .with_marketing_plan_id(request.marketing_plan_id.as_deref()),
            )
            .await;

        let webhook_request = WebhookRequest::new(&request.text, &user_id, &conversation_id)
            .with_context(request.context);

        let reply = match self.backend.exchange(webhook_request).await {
            Ok(reply) => {
                if let Some(echoed) = reply
                    .conversation_id
                    .as_deref()
                    .filter(|echoed| *echoed != conversation_id)
                {
                    log::warn!(
                        "Ignoring echoed conversation id {}, keeping {}",
                        echoed,
                        conversation_id
                    );
                }

                let message = self
                    .persist(
                        NewMessage::assistant(&user_id, &reply.text)
                            .with_conversation_id(&conversation_id)
                            .with_marketing_plan_id(request.marketing_plan_id.as_deref()),
                    )
                    .await;
                Ok(AssistantReply {
                    text: reply.text,
                    message,
                })
            }
            Err(err) => {
                log::error!("Exchange failed in conversation {}: {}", conversation_id, err);
                Err(err)
            }
        };

        Ok(ExchangeOutcome {
            conversation_id,
            user_message,
            reply,
        })
    }

    async fn persist(&self, message: NewMessage) -> Option<ChatMessage> {
        let role = message.role();
        match self.store.append(message).await {
            Ok(message) => Some(message),
            Err(err) => {
                let err = SessionError::persistence(&err);
                log::error!("Failed to persist {} turn: {}", role, err);
                None
            }
        }
    }
}
