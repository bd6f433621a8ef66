//! Subscription repository.
//!
//! A subscription relates exactly one chat to exactly one topic; the
//! composite primary key keeps at most one row per pair.

use std::collections::BTreeMap;

use super::{map_insert_error, ChatId, DbPool, Topic};
use crate::Result;

/// A topic together with whether a given chat is subscribed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicStatus {
    pub topic: Topic,
    pub subscribed: bool,
}

/// A topic together with its current subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSubscribers {
    pub topic: Topic,
    pub subscribers: Vec<ChatId>,
}

#[derive(Debug, sqlx::FromRow)]
struct TopicStatusRow {
    name: String,
    url: String,
    subscribed: bool,
}

impl From<TopicStatusRow> for TopicStatus {
    fn from(row: TopicStatusRow) -> Self {
        TopicStatus {
            topic: Topic::new(row.name, row.url),
            subscribed: row.subscribed,
        }
    }
}

/// Repository for subscription operations.
pub struct SubscriptionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Subscribe a chat to a topic.
    ///
    /// Returns `AlreadyExists` for a duplicate pair and `NotFound` when the
    /// chat or topic does not exist.
    pub async fn create(&self, chat_id: ChatId, topic_name: &str) -> Result<()> {
        sqlx::query("INSERT INTO subscriptions (chat_id, topic_name) VALUES ($1, $2)")
            .bind(chat_id)
            .bind(topic_name)
            .execute(self.pool)
            .await
            .map_err(|e| map_insert_error(e, &format!("subscription to {topic_name}")))?;

        Ok(())
    }

    /// Remove a subscription. Returns whether a row was removed.
    pub async fn delete(&self, chat_id: ChatId, topic_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE chat_id = $1 AND topic_name = $2")
            .bind(chat_id)
            .bind(topic_name)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Check whether a chat is subscribed to a topic.
    pub async fn exists(&self, chat_id: ChatId, topic_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE chat_id = $1 AND topic_name = $2)",
        )
        .bind(chat_id)
        .bind(topic_name)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Flip the subscription state for a pair and return the new state.
    pub async fn toggle(&self, chat_id: ChatId, topic_name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed =
            sqlx::query("DELETE FROM subscriptions WHERE chat_id = $1 AND topic_name = $2")
                .bind(chat_id)
                .bind(topic_name)
                .execute(&mut *tx)
                .await?;

        let subscribed = if removed.rows_affected() > 0 {
            false
        } else {
            sqlx::query("INSERT INTO subscriptions (chat_id, topic_name) VALUES ($1, $2)")
                .bind(chat_id)
                .bind(topic_name)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_insert_error(e, &format!("subscription to {topic_name}")))?;
            true
        };

        tx.commit().await?;
        Ok(subscribed)
    }

    /// List the chats subscribed to a topic, ordered by id.
    pub async fn subscribers_of(&self, topic_name: &str) -> Result<Vec<ChatId>> {
        let chats: Vec<ChatId> = sqlx::query_scalar(
            "SELECT chat_id FROM subscriptions WHERE topic_name = $1 ORDER BY chat_id",
        )
        .bind(topic_name)
        .fetch_all(self.pool)
        .await?;

        Ok(chats)
    }

    /// List every topic with the subscription status of one chat.
    pub async fn topics_for_chat(&self, chat_id: ChatId) -> Result<Vec<TopicStatus>> {
        let rows = sqlx::query_as::<_, TopicStatusRow>(
            r#"
            SELECT t.name, t.url, s.chat_id IS NOT NULL AS subscribed
            FROM topics t
            LEFT JOIN subscriptions s
                ON s.topic_name = t.name AND s.chat_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(chat_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(TopicStatus::from).collect())
    }

    /// List every topic with its current subscribers.
    ///
    /// Topics without subscribers are included with an empty list.
    pub async fn topics_with_subscribers(&self) -> Result<Vec<TopicSubscribers>> {
        let topics = sqlx::query_as::<_, Topic>("SELECT name, url FROM topics ORDER BY name")
            .fetch_all(self.pool)
            .await?;

        let pairs: Vec<(String, ChatId)> = sqlx::query_as(
            "SELECT topic_name, chat_id FROM subscriptions ORDER BY topic_name, chat_id",
        )
        .fetch_all(self.pool)
        .await?;

        let mut by_topic: BTreeMap<String, Vec<ChatId>> = BTreeMap::new();
        for (topic_name, chat_id) in pairs {
            by_topic.entry(topic_name).or_default().push(chat_id);
        }

        Ok(topics
            .into_iter()
            .map(|topic| {
                let subscribers = by_topic.remove(&topic.name).unwrap_or_default();
                TopicSubscribers { topic, subscribers }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ChatRepository, TopicRepository};
    use crate::{Database, NotifierError};

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let topics = TopicRepository::new(db.pool());
        topics
            .create(&Topic::new("biodiversity", "https://example.com/bio"))
            .await
            .unwrap();
        topics
            .create(&Topic::new("climate", "https://example.com/climate"))
            .await
            .unwrap();
        let chats = ChatRepository::new(db.pool());
        chats.create(1).await.unwrap();
        chats.create(2).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_and_exists() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        assert!(!repo.exists(1, "biodiversity").await.unwrap());
        repo.create(1, "biodiversity").await.unwrap();
        assert!(repo.exists(1, "biodiversity").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        repo.create(1, "biodiversity").await.unwrap();
        let result = repo.create(1, "biodiversity").await;
        assert!(matches!(result, Err(NotifierError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_create_unknown_topic() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        let result = repo.create(1, "unknown").await;
        assert!(matches!(result, Err(NotifierError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        repo.create(1, "climate").await.unwrap();
        assert!(repo.delete(1, "climate").await.unwrap());
        assert!(!repo.delete(1, "climate").await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        assert!(repo.toggle(2, "climate").await.unwrap());
        assert!(repo.exists(2, "climate").await.unwrap());
        assert!(!repo.toggle(2, "climate").await.unwrap());
        assert!(!repo.exists(2, "climate").await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribers_of() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        repo.create(2, "biodiversity").await.unwrap();
        repo.create(1, "biodiversity").await.unwrap();
        repo.create(1, "climate").await.unwrap();

        assert_eq!(repo.subscribers_of("biodiversity").await.unwrap(), vec![1, 2]);
        assert_eq!(repo.subscribers_of("climate").await.unwrap(), vec![1]);
        assert!(repo.subscribers_of("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_topics_for_chat() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        repo.create(1, "climate").await.unwrap();
        repo.create(2, "biodiversity").await.unwrap();

        let statuses = repo.topics_for_chat(1).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].topic.name, "biodiversity");
        assert!(!statuses[0].subscribed);
        assert_eq!(statuses[1].topic.name, "climate");
        assert!(statuses[1].subscribed);
    }

    #[tokio::test]
    async fn test_topics_with_subscribers() {
        let db = setup_db().await;
        let repo = SubscriptionRepository::new(db.pool());

        repo.create(1, "biodiversity").await.unwrap();
        repo.create(2, "biodiversity").await.unwrap();

        let topics = repo.topics_with_subscribers().await.unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].topic.name, "biodiversity");
        assert_eq!(topics[0].subscribers, vec![1, 2]);
        assert_eq!(topics[1].topic.name, "climate");
        assert!(topics[1].subscribers.is_empty());
    }
}
