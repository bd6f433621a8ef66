//! Database schema and migrations.
//!
//! Migrations are applied in order when the database is first opened or
//! upgraded; `schema_version` tracks which ones already ran.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Topics, chats and subscriptions
    r#"
-- Watched document listings
CREATE TABLE topics (
    name        TEXT PRIMARY KEY,
    url         TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Recipients that ran /start
CREATE TABLE chats (
    id          INTEGER PRIMARY KEY,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- At most one subscription per (chat, topic)
CREATE TABLE subscriptions (
    chat_id     INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    topic_name  TEXT NOT NULL REFERENCES topics(name) ON DELETE CASCADE,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (chat_id, topic_name)
);

CREATE INDEX idx_subscriptions_topic_name ON subscriptions(topic_name);
"#,
    // v2: Persisted seen-set
    r#"
CREATE TABLE seen_documents (
    topic_name    TEXT NOT NULL REFERENCES topics(name) ON DELETE CASCADE,
    document_key  TEXT NOT NULL,            -- hex SHA-256 of symbol + titles
    symbol        TEXT NOT NULL,
    title         TEXT NOT NULL,            -- JSON object keyed by language tag
    seen_at       TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (topic_name, document_key)
);
"#,
];
