use crate::config::constants::HISTORY_LIMIT;

/// Scoped message query. `user_id` is mandatory so a query can never read
/// another user's turns.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterMessages {
    user_id: String,
    conversation_id: Option<String>,
    marketing_plan_id: Option<String>,
    limit: usize,
}

impl FilterMessages {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: None,
            marketing_plan_id: None,
            limit: HISTORY_LIMIT,
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_marketing_plan_id(mut self, marketing_plan_id: impl Into<String>) -> Self {
        self.marketing_plan_id = Some(marketing_plan_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
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

    pub fn limit(&self) -> usize {
        self.limit
    }
}
