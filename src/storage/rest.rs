#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;

use std::time;

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::config::constants::REST_MESSAGES_PATH;
use crate::config::{RestStorage, expand_env, user_agent};
use crate::models::{ChatMessage, NewMessage, storage::FilterMessages};
use crate::storage::MessageStore;

/// Message store backed by a hosted row store speaking the PostgREST
/// dialect (`/rest/v1/<table>` with `eq.` filters).
pub struct Rest {
    url: String,
    api_key: Option<String>,
    timeout: Option<time::Duration>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    conversation_id: Option<&'a str>,
    marketing_plan_id: Option<&'a str>,
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConversationRow {
    conversation_id: Option<String>,
}

impl TryFrom<&RestStorage> for Rest {
    type Error = eyre::Error;

    fn try_from(value: &RestStorage) -> Result<Self> {
        let url = expand_env(&value.url);
        if url.trim().is_empty() {
            bail!("rest storage url is not configured");
        }
        let mut rest = Rest::new(url.trim_end_matches('/'));
        if let Some(api_key) = value.api_key.as_deref() {
            rest = rest.with_api_key(&expand_env(api_key));
        }
        if let Some(timeout) = value.timeout() {
            rest = rest.with_timeout(timeout);
        }
        Ok(rest)
    }
}

impl Rest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: None,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.url, REST_MESSAGES_PATH))
            .header("User-Agent", user_agent());

        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        if let Some(api_key) = &self.api_key {
            req = req.header("apikey", api_key).bearer_auth(api_key);
        }
        req
    }
}

async fn check_status(res: Response) -> Result<Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let http_code = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    log::error!("Store error response ({}): {}", http_code, body);
    bail!("store responded with status {}: {}", http_code, body)
}

#[async_trait]
impl MessageStore for Rest {
    async fn append(&self, message: NewMessage) -> Result<ChatMessage> {
        let row = InsertRow {
            user_id: message.user_id(),
            conversation_id: message.conversation_id(),
            marketing_plan_id: message.marketing_plan_id(),
            role: message.role().as_str(),
            content: message.content(),
        };

        let res = self
            .request(Method::POST)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .wrap_err("inserting chat message")?;

        let mut rows = check_status(res)
            .await?
            .json::<Vec<ChatMessage>>()
            .await
            .wrap_err("parsing inserted chat message")?;

        if rows.is_empty() {
            bail!("store returned no row for the inserted message");
        }
        Ok(rows.swap_remove(0))
    }

    async fn list_by_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        self.list_messages(
            FilterMessages::new(user_id)
                .with_conversation_id(conversation_id)
                .with_limit(limit),
        )
        .await
    }

    async fn list_messages(&self, filter: FilterMessages) -> Result<Vec<ChatMessage>> {
        let res = self
            .request(Method::GET)
            .query(&filter_to_params(&filter))
            .send()
            .await
            .wrap_err("listing chat messages")?;

        let messages = check_status(res)
            .await?
            .json::<Vec<ChatMessage>>()
            .await
            .wrap_err("parsing chat messages")?;
        Ok(messages)
    }

    async fn latest_conversation_id(&self, user_id: &str) -> Result<Option<String>> {
        let res = self
            .request(Method::GET)
            .query(&[
                ("select", "conversation_id".to_string()),
                ("user_id", format!("eq.{}", user_id)),
                ("conversation_id", "not.is.null".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .wrap_err("fetching latest conversation id")?;

        let rows = check_status(res)
            .await?
            .json::<Vec<ConversationRow>>()
            .await
            .wrap_err("parsing latest conversation id")?;
        Ok(rows.into_iter().next().and_then(|row| row.conversation_id))
    }

    async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<usize> {
        let res = self
            .request(Method::DELETE)
            .header("Prefer", "return=representation")
            .query(&[
                ("select", "id".to_string()),
                ("user_id", format!("eq.{}", user_id)),
                ("conversation_id", format!("eq.{}", conversation_id)),
            ])
            .send()
            .await
            .wrap_err("deleting conversation")?;

        let rows = check_status(res)
            .await?
            .json::<Vec<serde_json::Value>>()
            .await
            .wrap_err("parsing deleted rows")?;
        Ok(rows.len())
    }
}

fn filter_to_params(filter: &FilterMessages) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("user_id", format!("eq.{}", filter.user_id())),
    ];

    if let Some(conversation_id) = filter.conversation_id() {
        params.push(("conversation_id", format!("eq.{}", conversation_id)));
    }

    if let Some(marketing_plan_id) = filter.marketing_plan_id() {
        params.push(("marketing_plan_id", format!("eq.{}", marketing_plan_id)));
    }

    params.push(("order", "created_at.asc".to_string()));
    params.push(("limit", filter.limit().to_string()));
    params
}
