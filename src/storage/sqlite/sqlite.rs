#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio_rusqlite::{Connection, OpenFlags, Row, ToSql, named_params, params};

use crate::models::{ChatMessage, NewMessage, Role, storage::FilterMessages};
use crate::storage::MessageStore;

use super::migration::MIGRATION;

const SELECT_MESSAGES: &str = "SELECT id, user_id, conversation_id, marketing_plan_id, role, content, created_at FROM chat_messages WHERE user_id = :user_id";

pub struct Sqlite {
    conn: Connection,
}

impl Sqlite {
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(path) => {
                if let Some(dir) = std::path::Path::new(path).parent() {
                    std::fs::create_dir_all(dir)
                        .wrap_err(format!("creating directory {}", dir.display()))?;
                }
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
                )
                .await
                .wrap_err(format!("opening database path: {}", path))?
            }
            None => Connection::open_in_memory()
                .await
                .wrap_err("opening in-memory database")?,
        };

        let ret = Self { conn };
        ret.run_migration().await.wrap_err("running migration")?;
        Ok(ret)
    }

    async fn run_migration(&self) -> Result<()> {
        self.conn
            .call(|conn| Ok(conn.execute_batch(MIGRATION)?))
            .await
            .wrap_err("executing migration")?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for Sqlite {
    async fn append(&self, message: NewMessage) -> Result<ChatMessage> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let created_at = chrono::DateTime::from_timestamp_millis(now)
            .ok_or_else(|| eyre::eyre!("invalid timestamp {}", now))?;

        let persisted = ChatMessage::from_new(id, created_at, message);
        let row = persisted.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO chat_messages (id, user_id, conversation_id, marketing_plan_id, role, content, created_at)
            VALUES (:id, :user_id, :conversation_id, :marketing_plan_id, :role, :content, :created_at)"#,
                    named_params! {
                        ":id": row.id(),
                        ":user_id": row.user_id(),
                        ":conversation_id": row.conversation_id(),
                        ":marketing_plan_id": row.marketing_plan_id(),
                        ":role": row.role().as_str(),
                        ":content": row.content(),
                        ":created_at": row.created_at().timestamp_millis(),
                    },
                )?;
                Ok(())
            })
            .await
            .wrap_err("inserting chat message")?;

        log::trace!(
            "Appended {} message {} to conversation {:?}",
            persisted.role(),
            persisted.id(),
            persisted.conversation_id()
        );
        Ok(persisted)
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
        let messages = self
            .conn
            .call(move |conn| {
                let (query, params) = filter_to_query(&filter);
                let mut stmt = conn.prepare(&query)?;
                let params: Vec<(&str, &dyn ToSql)> =
                    params.iter().map(|(n, v)| (*n, v.as_ref())).collect();
                let mut rows = stmt.query(params.as_slice())?;

                let mut messages = vec![];
                while let Some(row) = rows.next()? {
                    messages.push(row_to_message(row)?);
                }
                Ok(messages)
            })
            .await
            .wrap_err("listing chat messages")?;
        Ok(messages)
    }

    async fn latest_conversation_id(&self, user_id: &str) -> Result<Option<String>> {
        let user_id = user_id.to_string();
        let conversation_id = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT conversation_id FROM chat_messages
            WHERE user_id = ? AND conversation_id IS NOT NULL
            ORDER BY created_at DESC, seq DESC
            LIMIT 1"#,
                )?;
                let mut rows = stmt.query(params![user_id])?;
                let conversation_id: Option<String> = match rows.next()? {
                    Some(row) => row.get(0)?,
                    None => None,
                };
                Ok(conversation_id)
            })
            .await
            .wrap_err("fetching latest conversation id")?;
        Ok(conversation_id)
    }

    async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let deleted = tx.execute(
                    "DELETE FROM chat_messages WHERE user_id = ? AND conversation_id = ?",
                    params![user_id, conversation_id],
                )?;
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .wrap_err("deleting conversation")?;
        Ok(deleted)
    }
}

fn row_to_message(row: &Row<'_>) -> Result<ChatMessage, tokio_rusqlite::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let conversation_id: Option<String> = row.get(2)?;
    let marketing_plan_id: Option<String> = row.get(3)?;
    let role: String = row.get(4)?;
    let content: String = row.get(5)?;
    let created_at: i64 = row.get(6)?;

    let role = role
        .parse::<Role>()
        .map_err(|e| tokio_rusqlite::Error::Other(e.into()))?;
    let created_at = chrono::DateTime::from_timestamp_millis(created_at).ok_or(
        tokio_rusqlite::Error::Other(eyre::eyre!("invalid created_at").into()),
    )?;

    let mut message = NewMessage::new(user_id, role, content)
        .with_marketing_plan_id(marketing_plan_id.as_deref());
    if let Some(conversation_id) = conversation_id {
        message = message.with_conversation_id(conversation_id);
    }
    Ok(ChatMessage::from_new(id, created_at, message))
}

fn filter_to_query(filter: &FilterMessages) -> (String, Vec<(&str, Box<dyn ToSql>)>) {
    let mut query = String::from(SELECT_MESSAGES);
    let mut params: Vec<(&str, Box<dyn ToSql>)> =
        vec![(":user_id", Box::new(filter.user_id().to_string()))];

    if let Some(conversation_id) = filter.conversation_id() {
        query.push_str(" AND conversation_id = :conversation_id");
        params.push((":conversation_id", Box::new(conversation_id.to_string())));
    }

    if let Some(marketing_plan_id) = filter.marketing_plan_id() {
        query.push_str(" AND marketing_plan_id = :marketing_plan_id");
        params.push((":marketing_plan_id", Box::new(marketing_plan_id.to_string())));
    }

    query.push_str(" ORDER BY created_at ASC, seq ASC LIMIT :limit");
    params.push((":limit", Box::new(filter.limit() as i64)));

    (query, params)
}
