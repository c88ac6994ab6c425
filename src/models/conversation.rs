#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use crate::models::{ChatMessage, Role};

const CONVERSATION_PREFIX: &str = "conv_";
const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Mint a new conversation id in the form `conv_<unix millis>_<base36>`.
///
/// Ids are unique with overwhelming probability only; a collision simply
/// merges two threads.
pub fn mint_conversation_id() -> String {
    mint_conversation_id_at(chrono::Utc::now())
}

pub(crate) fn mint_conversation_id_at(now: chrono::DateTime<chrono::Utc>) -> String {
    let mut seed = uuid::Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(SUFFIX_LEN);
    for _ in 0..SUFFIX_LEN {
        suffix.push(BASE36[(seed % 36) as usize] as char);
        seed /= 36;
    }
    format!(
        "{}{}_{}",
        CONVERSATION_PREFIX,
        now.timestamp_millis(),
        suffix
    )
}

pub fn is_minted_conversation_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix(CONVERSATION_PREFIX) else {
        return false;
    };
    match rest.split_once('_') {
        Some((ts, suffix)) => {
            !ts.is_empty()
                && ts.chars().all(|c| c.is_ascii_digit())
                && suffix.len() == SUFFIX_LEN
                && suffix.bytes().all(|b| BASE36.contains(&b))
        }
        None => false,
    }
}

/// Persistence state of a transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Appended optimistically, the store has not confirmed it yet.
    Pending,
    /// The store returned this row.
    Confirmed(ChatMessage),
    /// Never persisted: a synthetic line or a write that failed.
    Local,
}

/// One line of the in-memory transcript of a chat surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    local_id: String,
    role: Role,
    content: String,
    created_at: chrono::DateTime<chrono::Utc>,
    delivery: Delivery,
}

impl TranscriptEntry {
    pub fn pending(role: Role, content: impl Into<String>) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: chrono::Utc::now(),
            delivery: Delivery::Pending,
        }
    }

    pub fn local(role: Role, content: impl Into<String>) -> Self {
        Self {
            delivery: Delivery::Local,
            ..Self::pending(role, content)
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, Delivery::Pending)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.delivery, Delivery::Confirmed(_))
    }

    pub fn message(&self) -> Option<&ChatMessage> {
        match &self.delivery {
            Delivery::Confirmed(message) => Some(message),
            _ => None,
        }
    }

    /// Settle a pending entry. `None` means the write failed and the entry
    /// stays visible as a local line.
    pub fn settle(&mut self, message: Option<ChatMessage>) {
        self.delivery = match message {
            Some(message) => {
                self.created_at = message.created_at();
                Delivery::Confirmed(message)
            }
            None => Delivery::Local,
        };
    }
}

impl From<ChatMessage> for TranscriptEntry {
    fn from(message: ChatMessage) -> Self {
        Self {
            local_id: message.id().to_string(),
            role: message.role(),
            content: message.content().to_string(),
            created_at: message.created_at(),
            delivery: Delivery::Confirmed(message),
        }
    }
}
