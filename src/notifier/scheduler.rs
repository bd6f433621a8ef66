//! Poll scheduler and the per-topic poll pipeline.
//!
//! Each tick enumerates all topics and starts one independent pipeline
//! (fetch, diff, dispatch, record) per topic. A topic whose previous
//! pipeline is still running is skipped for that tick, so at most one poll
//! per topic is ever in flight.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dispatcher::DispatchQueue;
use super::fetcher::Fetcher;
use super::index::SubscriptionIndex;
use super::seen::SeenStore;
use crate::db::Topic;
use crate::{NotifierError, Result};

/// Default delay before the first tick, in seconds.
pub const DEFAULT_INITIAL_DELAY_SECS: u64 = 5;

/// Result of one poll cycle for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Documents in the fetched listing.
    pub fetched: usize,
    /// Documents not seen before.
    pub new: usize,
    /// New documents handed to every subscriber and recorded as seen.
    pub dispatched: usize,
    /// The listing was recorded as a silent baseline.
    pub baselined: bool,
}

/// Fetch, diff, dispatch and record for a single topic.
pub struct TopicPipeline {
    fetcher: Arc<dyn Fetcher>,
    seen: Arc<dyn SeenStore>,
    queue: DispatchQueue,
    fetch_timeout: Duration,
    baseline_new_topics: bool,
}

impl TopicPipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        seen: Arc<dyn SeenStore>,
        queue: DispatchQueue,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            seen,
            queue,
            fetch_timeout,
            baseline_new_topics: false,
        }
    }

    /// Record the first listing of a topic with an empty seen-set without
    /// notifying anyone.
    pub fn with_baseline(mut self, enabled: bool) -> Self {
        self.baseline_new_topics = enabled;
        self
    }

    /// Run one poll cycle for `topic`.
    ///
    /// A fetch failure leaves the seen-set untouched. Only documents the
    /// dispatcher actually handed to every subscriber are recorded.
    pub async fn poll(&self, topic: &Topic) -> Result<PollOutcome> {
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(topic)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(NotifierError::Timeout(format!(
                    "fetch of topic {} after {:?}",
                    topic.name, self.fetch_timeout
                )));
            }
        };

        let mut outcome = PollOutcome {
            fetched: fetched.len(),
            ..PollOutcome::default()
        };

        let new_documents = self.seen.unseen(&topic.name, &fetched).await?;
        outcome.new = new_documents.len();
        if new_documents.is_empty() {
            debug!("Topic {}: no new documents", topic.name);
            return Ok(outcome);
        }

        if self.baseline_new_topics && self.seen.seen_count(&topic.name).await? == 0 {
            self.seen.record(&topic.name, &new_documents).await?;
            info!(
                "Topic {}: recorded baseline of {} document(s)",
                topic.name, outcome.new
            );
            outcome.baselined = true;
            return Ok(outcome);
        }

        let report = self.queue.submit(&topic.name, new_documents).await?;
        outcome.dispatched = report.dispatched.len();

        if let Err(e) = self.seen.record(&topic.name, &report.dispatched).await {
            error!(
                "Topic {}: failed to record {} dispatched document(s): {}",
                topic.name, outcome.dispatched, e
            );
            return Err(e);
        }

        if report.interrupted {
            info!(
                "Topic {}: dispatch interrupted after {} of {} document(s)",
                topic.name, outcome.dispatched, outcome.new
            );
        }
        Ok(outcome)
    }
}

/// Counts for one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Topics known at the start of the tick.
    pub topics: usize,
    /// Pipelines started.
    pub started: usize,
    /// Topics skipped because their previous poll is still running.
    pub skipped: usize,
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Marks a topic as being polled until dropped.
struct InFlightGuard {
    in_flight: InFlight,
    topic: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, topic: &str) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string());
        inserted.then(|| Self {
            in_flight: Arc::clone(in_flight),
            topic: topic.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.topic);
    }
}

/// Periodic driver of topic poll cycles.
pub struct PollScheduler {
    index: Arc<dyn SubscriptionIndex>,
    pipeline: Arc<TopicPipeline>,
    poll_interval: Duration,
    initial_delay: Duration,
    in_flight: InFlight,
}

impl PollScheduler {
    pub fn new(
        index: Arc<dyn SubscriptionIndex>,
        pipeline: TopicPipeline,
        poll_interval: Duration,
    ) -> Self {
        Self {
            index,
            pipeline: Arc::new(pipeline),
            poll_interval,
            initial_delay: Duration::from_secs(DEFAULT_INITIAL_DELAY_SECS),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Run the scheduler until `shutdown` is set to true.
    ///
    /// Overrunning ticks are skipped rather than queued. On shutdown no new
    /// pipelines are started and the running ones are awaited.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Poll scheduler started (interval: {} seconds, first tick in {} seconds)",
            self.poll_interval.as_secs_f64(),
            self.initial_delay.as_secs()
        );

        let mut timer = interval_at(Instant::now() + self.initial_delay, self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = timer.tick() => {
                    while let Some(result) = tasks.try_join_next() {
                        log_join_result(result);
                    }
                    let summary = self.tick(&mut tasks).await;
                    if summary.topics > 0 {
                        info!(
                            "Tick: {} topic(s), {} started, {} still running",
                            summary.topics, summary.started, summary.skipped
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            "Poll scheduler stopping; waiting for {} in-flight poll(s)",
            tasks.len()
        );
        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }
        info!("Poll scheduler stopped");
    }

    /// Start a pipeline for every topic that is not already being polled.
    ///
    /// Pipelines are spawned onto `tasks`; the returned summary does not wait
    /// for them.
    pub async fn tick(&self, tasks: &mut JoinSet<()>) -> TickSummary {
        let topics = match self.index.topics().await {
            Ok(topics) => topics,
            Err(e) => {
                error!("Failed to list topics: {}", e);
                return TickSummary::default();
            }
        };

        let mut summary = TickSummary {
            topics: topics.len(),
            ..TickSummary::default()
        };

        for entry in topics {
            let topic = entry.topic;
            let Some(guard) = InFlightGuard::acquire(&self.in_flight, &topic.name) else {
                debug!("Topic {} is still being polled; skipping", topic.name);
                summary.skipped += 1;
                continue;
            };

            let pipeline = Arc::clone(&self.pipeline);
            tasks.spawn(async move {
                let _guard = guard;
                match pipeline.poll(&topic).await {
                    Ok(outcome) if outcome.dispatched > 0 => info!(
                        "Topic {}: {} new document(s) dispatched",
                        topic.name, outcome.dispatched
                    ),
                    Ok(_) => {}
                    Err(NotifierError::Shutdown) => {
                        debug!("Topic {}: poll abandoned during shutdown", topic.name)
                    }
                    Err(e) if e.is_transient() => {
                        warn!("Topic {}: poll failed, retrying next tick: {}", topic.name, e)
                    }
                    Err(e) => error!("Topic {}: poll failed: {}", topic.name, e),
                }
            });
            summary.started += 1;
        }

        summary
    }
}

fn log_join_result(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Poll task panicked: {}", e);
        }
    }
}
