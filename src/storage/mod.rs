pub mod rest;
pub mod sqlite;

use std::sync::Arc;

use crate::{
    config::{StorageConfig, resolve_path},
    models::{ChatMessage, NewMessage, storage::FilterMessages},
};
use async_trait::async_trait;
use eyre::Result;
use rest::Rest;
use sqlite::Sqlite;

#[cfg(test)]
use mockall::automock;

/// Durable, append-only store of chat turns. Every operation is scoped to
/// one user.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageStore {
    /// Persist a turn. The store assigns `id` and `created_at`.
    async fn append(&self, message: NewMessage) -> Result<ChatMessage>;

    /// Turns of one conversation, oldest first, at most `limit` of them.
    async fn list_by_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>>;

    async fn list_messages(&self, filter: FilterMessages) -> Result<Vec<ChatMessage>>;

    /// Conversation id of the user's most recent turn that has one.
    async fn latest_conversation_id(&self, user_id: &str) -> Result<Option<String>>;

    /// Remove every turn of the conversation. Returns the number removed.
    async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<usize>;
}

pub type ArcStore = Arc<dyn MessageStore + Send + Sync>;

pub async fn new_storage(config: &StorageConfig) -> Result<ArcStore> {
    let storage: ArcStore = match config {
        StorageConfig::Sqlite(sqlite_config) => {
            let path = sqlite_config.path().map(resolve_path).transpose()?;
            Arc::new(Sqlite::new(path.as_deref()).await?)
        }
        StorageConfig::Rest(rest_config) => Arc::new(Rest::try_from(rest_config)?),
    };
    Ok(storage)
}
