//! In-process fakes shared by the notifier unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::dispatcher::MessageSender;
use super::document::Document;
use super::fetcher::Fetcher;
use super::index::SubscriptionIndex;
use crate::db::{ChatId, Topic, TopicSubscribers};
use crate::{NotifierError, Result};

/// Fixed topics and subscribers.
pub struct StaticIndex {
    topics: Vec<TopicSubscribers>,
}

impl StaticIndex {
    pub fn new(entries: &[(&str, &[ChatId])]) -> Self {
        Self {
            topics: entries
                .iter()
                .map(|(name, chats)| TopicSubscribers {
                    topic: Topic::new(*name, format!("https://example.com/{name}")),
                    subscribers: chats.to_vec(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl SubscriptionIndex for StaticIndex {
    async fn topics(&self) -> Result<Vec<TopicSubscribers>> {
        Ok(self.topics.clone())
    }

    async fn subscribers_of(&self, topic: &str) -> Result<BTreeSet<ChatId>> {
        Ok(self
            .topics
            .iter()
            .filter(|entry| entry.topic.name == topic)
            .flat_map(|entry| entry.subscribers.iter().copied())
            .collect())
    }
}

/// Records every send; selected recipients fail or never answer.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(ChatId, String)>>,
    failing: BTreeSet<ChatId>,
    hanging: BTreeSet<ChatId>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(chats: &[ChatId]) -> Self {
        Self {
            failing: chats.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn hanging_for(chats: &[ChatId]) -> Self {
        Self {
            hanging: chats.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Sends in the order they were attempted.
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Sends sorted by recipient, then text.
    pub fn sent_sorted(&self) -> Vec<(ChatId, String)> {
        let mut sent = self.sent();
        sent.sort();
        sent
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, recipient: ChatId, text: &str) -> Result<()> {
        if self.hanging.contains(&recipient) {
            std::future::pending::<()>().await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient, text.to_string()));
        if self.failing.contains(&recipient) {
            return Err(NotifierError::Delivery(
                "Forbidden: bot was blocked by the user".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
enum Listing {
    Documents(Vec<Document>),
    Failure(String),
}

/// Fetcher returning a scripted listing per topic.
#[derive(Default)]
pub struct ScriptedFetcher {
    listings: Mutex<HashMap<String, Listing>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, topic: &str, documents: Vec<Document>) {
        self.listings
            .lock()
            .unwrap()
            .insert(topic.to_string(), Listing::Documents(documents));
    }

    pub fn fail(&self, topic: &str, message: &str) {
        self.listings
            .lock()
            .unwrap()
            .insert(topic.to_string(), Listing::Failure(message.to_string()));
    }

    pub fn delay(&self, topic: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(topic.to_string(), delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, topic: &Topic) -> Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(&topic.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let listing = self.listings.lock().unwrap().get(&topic.name).cloned();
        match listing {
            Some(Listing::Documents(documents)) => Ok(documents),
            Some(Listing::Failure(message)) => Err(NotifierError::Fetch(message)),
            None => Ok(Vec::new()),
        }
    }
}
