use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(eyre::eyre!("unknown role: {}", other)),
        }
    }
}

/// A persisted turn. Only stores construct these; `id` and `created_at` are
/// assigned at persistence time and nothing mutates a message afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: String,
    user_id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    marketing_plan_id: Option<String>,
    role: Role,
    content: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    pub(crate) fn from_new(
        id: impl Into<String>,
        created_at: chrono::DateTime<chrono::Utc>,
        message: NewMessage,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: message.user_id,
            conversation_id: message.conversation_id,
            marketing_plan_id: message.marketing_plan_id,
            role: message.role,
            content: message.content,
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn marketing_plan_id(&self) -> Option<&str> {
        self.marketing_plan_id.as_deref()
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
}

/// Input of `MessageStore::append`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    user_id: String,
    conversation_id: Option<String>,
    marketing_plan_id: Option<String>,
    role: Role,
    content: String,
}

impl NewMessage {
    pub fn new(user_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: None,
            marketing_plan_id: None,
            role,
            content: content.into(),
        }
    }

    pub fn user(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(user_id, Role::User, content)
    }

    pub fn assistant(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(user_id, Role::Assistant, content)
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_marketing_plan_id(mut self, marketing_plan_id: Option<&str>) -> Self {
        self.marketing_plan_id = marketing_plan_id.map(|s| s.to_string());
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn marketing_plan_id(&self) -> Option<&str> {
        self.marketing_plan_id.as_deref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}
