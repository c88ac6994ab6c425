use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body posted to the chat webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub message: String,
    pub user_id: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl WebhookRequest {
    pub fn new(
        message: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = if context.is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }
}

/// Reply schema accepted from the chat webhook.
///
/// The reply text is the first non-empty string among `response`, `message`,
/// `text` and `output`, in that order. When none is set the same lookup is
/// applied to the nested `data` object. Any other shape is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<WebhookReply>>,
    #[serde(
        default,
        alias = "conversation_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookReply {
    pub fn reply_text(&self) -> Option<&str> {
        [&self.response, &self.message, &self.text, &self.output]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|text| !text.is_empty())
            .or_else(|| self.data.as_ref().and_then(|data| data.reply_text()))
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|data| data.conversation_id()))
    }

    pub fn error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|data| data.error()))
    }
}

/// A validated answer from the webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeReply {
    pub text: String,
    pub conversation_id: Option<String>,
}
