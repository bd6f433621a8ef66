//! Seen-set store.
//!
//! Tracks, per topic, the identities of documents that were already
//! notified. Only the pipeline owning a topic's current poll cycle mutates
//! that topic's set; the scheduler enforces this with its in-flight guard.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::document::{Document, DocumentKey};
use crate::db::Database;
use crate::{NotifierError, Result};

/// Per-topic set of already observed documents.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Return the fetched documents not yet recorded for the topic.
    ///
    /// Source order is preserved and duplicates within the batch are
    /// reported once. Nothing is recorded.
    async fn unseen(&self, topic: &str, fetched: &[Document]) -> Result<Vec<Document>>;

    /// Record documents as seen for the topic. Already recorded documents
    /// are ignored.
    async fn record(&self, topic: &str, documents: &[Document]) -> Result<()>;

    /// Number of documents recorded for the topic.
    async fn seen_count(&self, topic: &str) -> Result<usize>;

    /// Return the new documents of `fetched` and record them in one step.
    ///
    /// Calling this twice with the same batch yields the new documents only
    /// on the first call.
    async fn diff_and_record(&self, topic: &str, fetched: &[Document]) -> Result<Vec<Document>> {
        let new_documents = self.unseen(topic, fetched).await?;
        self.record(topic, &new_documents).await?;
        Ok(new_documents)
    }
}

/// Keep the first occurrence of every document whose key is not in `seen`.
fn filter_unseen(seen: &HashSet<DocumentKey>, fetched: &[Document]) -> Vec<Document> {
    let mut batch = HashSet::new();
    fetched
        .iter()
        .filter(|doc| {
            let key = doc.key();
            !seen.contains(&key) && batch.insert(key)
        })
        .cloned()
        .collect()
}

/// Volatile seen-set; history is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    topics: Mutex<HashMap<String, HashSet<DocumentKey>>>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, HashSet<DocumentKey>>>> {
        self.topics
            .lock()
            .map_err(|_| NotifierError::Database("seen-set lock poisoned".to_string()))
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn unseen(&self, topic: &str, fetched: &[Document]) -> Result<Vec<Document>> {
        let topics = self.lock()?;
        let empty = HashSet::new();
        let seen = topics.get(topic).unwrap_or(&empty);
        Ok(filter_unseen(seen, fetched))
    }

    async fn record(&self, topic: &str, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let mut topics = self.lock()?;
        topics
            .entry(topic.to_string())
            .or_default()
            .extend(documents.iter().map(Document::key));
        Ok(())
    }

    async fn seen_count(&self, topic: &str) -> Result<usize> {
        Ok(self.lock()?.get(topic).map_or(0, HashSet::len))
    }
}

/// Seen-set persisted in the `seen_documents` table.
#[derive(Debug, Clone)]
pub struct SqlSeenStore {
    db: Database,
}

impl SqlSeenStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn keys_for_topic(&self, topic: &str) -> Result<HashSet<DocumentKey>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT document_key FROM seen_documents WHERE topic_name = $1")
                .bind(topic)
                .fetch_all(self.db.pool())
                .await?;

        Ok(keys.into_iter().map(DocumentKey::from).collect())
    }
}

#[async_trait]
impl SeenStore for SqlSeenStore {
    async fn unseen(&self, topic: &str, fetched: &[Document]) -> Result<Vec<Document>> {
        if fetched.is_empty() {
            return Ok(Vec::new());
        }
        let seen = self.keys_for_topic(topic).await?;
        Ok(filter_unseen(&seen, fetched))
    }

    async fn record(&self, topic: &str, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool().begin().await?;
        for doc in documents {
            let title = serde_json::to_string(&doc.title)
                .map_err(|e| NotifierError::Database(format!("failed to encode title: {e}")))?;
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO seen_documents (topic_name, document_key, symbol, title)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(topic)
            .bind(doc.key().as_str())
            .bind(&doc.symbol)
            .bind(&title)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn seen_count(&self, topic: &str) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM seen_documents WHERE topic_name = $1")
                .bind(topic)
                .fetch_one(self.db.pool())
                .await?;
        Ok(count as usize)
    }
}
