//! Chat (subscriber) repository.

use super::{map_insert_error, DbPool};
use crate::{NotifierError, Result};

/// Opaque recipient identifier (a Telegram chat id).
pub type ChatId = i64;

/// Repository for chat operations.
pub struct ChatRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ChatRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Register a chat.
    ///
    /// Returns `AlreadyExists` if the chat is already registered.
    pub async fn create(&self, id: ChatId) -> Result<()> {
        sqlx::query("INSERT INTO chats (id) VALUES ($1)")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| map_insert_error(e, &format!("chat {id}")))?;

        Ok(())
    }

    /// Check whether a chat is registered.
    pub async fn exists(&self, id: ChatId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)")
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        Ok(exists)
    }

    /// Remove a chat and, by cascade, all of its subscriptions.
    ///
    /// Returns `NotFound` if the chat was not registered.
    pub async fn delete(&self, id: ChatId) -> Result<()> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NotifierError::NotFound(format!("chat {id}")));
        }
        Ok(())
    }
}
