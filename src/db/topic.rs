//! Topic entity and repository.

use super::{map_insert_error, DbPool};
use crate::Result;

/// A watched document listing, identified by its unique name.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Topic {
    /// Unique topic name.
    pub name: String,
    /// URL of the listing page.
    pub url: String,
}

impl Topic {
    /// Create a new topic value.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Repository for topic operations.
pub struct TopicRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> TopicRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new topic.
    ///
    /// Returns `AlreadyExists` if a topic with the same name exists.
    pub async fn create(&self, topic: &Topic) -> Result<Topic> {
        sqlx::query("INSERT INTO topics (name, url) VALUES ($1, $2)")
            .bind(&topic.name)
            .bind(&topic.url)
            .execute(self.pool)
            .await
            .map_err(|e| map_insert_error(e, &format!("topic {}", topic.name)))?;

        Ok(topic.clone())
    }

    /// Get a topic by name.
    pub async fn get(&self, name: &str) -> Result<Option<Topic>> {
        let topic = sqlx::query_as::<_, Topic>("SELECT name, url FROM topics WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;

        Ok(topic)
    }

    /// List all topics ordered by name.
    pub async fn list(&self) -> Result<Vec<Topic>> {
        let topics = sqlx::query_as::<_, Topic>("SELECT name, url FROM topics ORDER BY name")
            .fetch_all(self.pool)
            .await?;

        Ok(topics)
    }

    /// Delete a topic, cascading to its subscriptions and seen documents.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM topics WHERE name = $1")
            .bind(name)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
