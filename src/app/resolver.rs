#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;

use crate::models::SessionError;
use crate::storage::ArcStore;

/// Which rule decided the conversation a surface continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The caller named the conversation.
    Explicit(String),
    /// The surface already holds an id from an earlier exchange.
    Cached(String),
    /// The user's most recent conversation in the store.
    Resumed(String),
    /// Nothing to continue; an id is minted on the first send.
    Fresh,
}

impl Resolution {
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Resolution::Explicit(id) | Resolution::Cached(id) | Resolution::Resumed(id) => {
                Some(id)
            }
            Resolution::Fresh => None,
        }
    }

    pub fn rule(&self) -> &'static str {
        match self {
            Resolution::Explicit(_) => "explicit",
            Resolution::Cached(_) => "cached",
            Resolution::Resumed(_) => "resumed",
            Resolution::Fresh => "fresh",
        }
    }
}

#[derive(Clone)]
pub struct ConversationResolver {
    store: ArcStore,
}

impl ConversationResolver {
    pub fn new(store: ArcStore) -> Self {
        Self { store }
    }

    /// Decide which conversation to continue. Only the last rule reads the
    /// store.
    pub async fn resolve(
        &self,
        user_id: &str,
        explicit: Option<&str>,
        cached: Option<&str>,
    ) -> Result<Resolution, SessionError> {
        if let Some(id) = explicit.filter(|id| !id.is_empty()) {
            return Ok(Resolution::Explicit(id.to_string()));
        }

        if let Some(id) = cached.filter(|id| !id.is_empty()) {
            return Ok(Resolution::Cached(id.to_string()));
        }

        let latest = self
            .store
            .latest_conversation_id(user_id)
            .await
            .map_err(|err| SessionError::persistence(&err))?;

        Ok(match latest {
            Some(id) => Resolution::Resumed(id),
            None => Resolution::Fresh,
        })
    }
}
