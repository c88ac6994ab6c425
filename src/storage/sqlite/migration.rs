pub(crate) const MIGRATION: &str = r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        conversation_id TEXT,
        marketing_plan_id TEXT,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chat_messages_user_conversation
        ON chat_messages (user_id, conversation_id, created_at);

    CREATE INDEX IF NOT EXISTS idx_chat_messages_user_created
        ON chat_messages (user_id, created_at);
"#;
