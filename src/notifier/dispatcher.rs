//! Notification dispatcher.
//!
//! Sends one message per (new document, subscriber) pair. Delivery is
//! at-most-once: a failed send is logged and never retried, and it does
//! not stop delivery to the remaining subscribers or documents.
//!
//! Pipelines hand their new documents to the dispatcher through a
//! [`DispatchQueue`]; a single worker task drains the queue and answers
//! each job with a [`DispatchReport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::document::Document;
use super::index::SubscriptionIndex;
use crate::db::ChatId;
use crate::{NotifierError, Result};

/// Sends to different subscribers of one document run concurrently up to
/// this limit.
const MAX_CONCURRENT_SENDS: usize = 8;

/// Outbound message channel.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a plain-text message to a recipient.
    async fn send(&self, recipient: ChatId, text: &str) -> Result<()>;
}

/// Outcome of dispatching a batch of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Documents for which every send attempt was made, in order.
    pub dispatched: Vec<Document>,
    /// Number of send attempts.
    pub attempts: usize,
    /// Number of failed send attempts.
    pub failures: usize,
    /// Dispatch stopped early because of shutdown.
    pub interrupted: bool,
}

/// Delivers rendered documents to the subscribers of a topic.
pub struct Dispatcher {
    index: Arc<dyn SubscriptionIndex>,
    sender: Arc<dyn MessageSender>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        index: Arc<dyn SubscriptionIndex>,
        sender: Arc<dyn MessageSender>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            index,
            sender,
            send_timeout,
        }
    }

    /// Notify every current subscriber of `topic` about each document.
    ///
    /// Fails only when the subscribers cannot be resolved; individual
    /// delivery failures are counted in the report.
    pub async fn notify(&self, topic: &str, documents: &[Document]) -> Result<DispatchReport> {
        self.notify_until(topic, documents, None).await
    }

    async fn notify_until(
        &self,
        topic: &str,
        documents: &[Document],
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<DispatchReport> {
        let subscribers = self.index.subscribers_of(topic).await?;
        let mut report = DispatchReport::default();

        for document in documents {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                report.interrupted = true;
                break;
            }

            let text = document.render();
            let results: Vec<(ChatId, Result<()>)> = stream::iter(subscribers.iter().copied())
                .map(|chat| {
                    let text = &text;
                    async move { (chat, self.send_one(chat, text).await) }
                })
                .buffer_unordered(MAX_CONCURRENT_SENDS)
                .collect()
                .await;

            for (chat, result) in results {
                report.attempts += 1;
                if let Err(e) = result {
                    report.failures += 1;
                    warn!(
                        "Failed to deliver {} ({}) to chat {}: {}",
                        document.symbol, topic, chat, e
                    );
                }
            }
            report.dispatched.push(document.clone());
        }

        debug!(
            "Dispatched {} document(s) for {} ({} attempts, {} failures)",
            report.dispatched.len(),
            topic,
            report.attempts,
            report.failures
        );
        Ok(report)
    }

    async fn send_one(&self, chat: ChatId, text: &str) -> Result<()> {
        match tokio::time::timeout(self.send_timeout, self.sender.send(chat, text)).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout(format!(
                "send to chat {} after {:?}",
                chat, self.send_timeout
            ))),
        }
    }

    /// Run the dispatcher as a background task draining a bounded queue.
    ///
    /// Once `shutdown` fires, the current job stops at the next document
    /// boundary and queued jobs are answered without sending. The task ends
    /// when every [`DispatchQueue`] clone is dropped.
    pub fn spawn(
        self,
        capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (DispatchQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<DispatchJob>(capacity.max(1));

        let handle = tokio::spawn(async move {
            info!("Dispatcher started");
            while let Some(job) = rx.recv().await {
                let result = self
                    .notify_until(&job.topic, &job.documents, Some(&shutdown))
                    .await;
                // The submitting pipeline may have been cancelled.
                let _ = job.reply.send(result);
            }
            info!("Dispatcher stopped");
        });

        (DispatchQueue { tx }, handle)
    }
}

struct DispatchJob {
    topic: String,
    documents: Vec<Document>,
    reply: oneshot::Sender<Result<DispatchReport>>,
}

/// Handle for submitting documents to a running dispatcher.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<DispatchJob>,
}

impl DispatchQueue {
    /// Submit documents for a topic and wait for the dispatch report.
    ///
    /// Returns `Shutdown` if the dispatcher is no longer running.
    pub async fn submit(&self, topic: &str, documents: Vec<Document>) -> Result<DispatchReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DispatchJob {
                topic: topic.to_string(),
                documents,
                reply,
            })
            .await
            .map_err(|_| NotifierError::Shutdown)?;

        rx.await.map_err(|_| NotifierError::Shutdown)?
    }
}
