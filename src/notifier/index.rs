//! Subscription index: read-only view of who is subscribed to what.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::db::{ChatId, Database, SubscriptionRepository, TopicSubscribers};
use crate::Result;

/// Resolves topics to their current subscribers.
///
/// Every call re-reads the underlying state, so subscription changes take
/// effect on the next poll cycle without a restart.
#[async_trait]
pub trait SubscriptionIndex: Send + Sync {
    /// All known topics with their current subscribers.
    async fn topics(&self) -> Result<Vec<TopicSubscribers>>;

    /// The chats currently subscribed to a topic.
    async fn subscribers_of(&self, topic: &str) -> Result<BTreeSet<ChatId>>;
}

/// Subscription index backed by the database.
#[derive(Debug, Clone)]
pub struct SqlSubscriptionIndex {
    db: Database,
}

impl SqlSubscriptionIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriptionIndex for SqlSubscriptionIndex {
    async fn topics(&self) -> Result<Vec<TopicSubscribers>> {
        SubscriptionRepository::new(self.db.pool())
            .topics_with_subscribers()
            .await
    }

    async fn subscribers_of(&self, topic: &str) -> Result<BTreeSet<ChatId>> {
        let chats = SubscriptionRepository::new(self.db.pool())
            .subscribers_of(topic)
            .await?;
        Ok(chats.into_iter().collect())
    }
}
