//! Application wiring.
//!
//! Builds the notifier from configuration and runs the poll scheduler,
//! the dispatcher and the bot side by side until shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::bot::{BotRunner, CommandHandler, TelegramClient, MAX_TOPIC_NAME_BYTES};
use crate::db::{SubscriptionRepository, Topic, TopicRepository};
use crate::notifier::{
    validate_url, Dispatcher, HttpFetcher, MemorySeenStore, PollScheduler, SeenStore,
    SqlSeenStore, SqlSubscriptionIndex, TopicPipeline,
};
use crate::{Config, Database, NotifierError, Result};

/// Per-topic line of the `list-topics` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicReport {
    pub topic: Topic,
    pub subscribers: usize,
    pub seen: usize,
}

/// Add a topic after checking its name and URL.
pub async fn add_topic(db: &Database, name: &str, url: &str) -> Result<Topic> {
    let name = name.trim();
    if name.is_empty() {
        return Err(NotifierError::Validation(
            "topic name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_TOPIC_NAME_BYTES {
        return Err(NotifierError::Validation(format!(
            "topic name is {} bytes long (max {} bytes)",
            name.len(),
            MAX_TOPIC_NAME_BYTES
        )));
    }
    validate_url(url)?;

    let topic = TopicRepository::new(db.pool())
        .create(&Topic::new(name, url))
        .await?;
    info!("Added topic {} ({})", topic.name, topic.url);
    Ok(topic)
}

/// Every topic with its subscriber count and persisted seen-set size.
pub async fn topic_report(db: &Database) -> Result<Vec<TopicReport>> {
    let topics = SubscriptionRepository::new(db.pool())
        .topics_with_subscribers()
        .await?;
    let seen = SqlSeenStore::new(db.clone());

    let mut report = Vec::with_capacity(topics.len());
    for entry in topics {
        let seen_count = seen.seen_count(&entry.topic.name).await?;
        report.push(TopicReport {
            subscribers: entry.subscribers.len(),
            seen: seen_count,
            topic: entry.topic,
        });
    }
    Ok(report)
}

/// The running notifier.
pub struct Application {
    config: Config,
    db: Database,
}

impl Application {
    /// Validate configuration, open the database and check every topic URL.
    ///
    /// Any failure here is a configuration error; nothing has been started.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let db = Database::open(&config.database.url).await?;

        for topic in TopicRepository::new(db.pool()).list().await? {
            validate_url(&topic.url).map_err(|e| {
                NotifierError::Config(format!("topic {} has an invalid URL: {e}", topic.name))
            })?;
        }

        Ok(Self { config, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Run until `signal` completes, then stop and wait for in-flight work.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let poll = &self.config.poll;
        let telegram = TelegramClient::new(&self.config.telegram, poll.send_timeout())?;
        let me = telegram
            .get_me()
            .await
            .map_err(|e| NotifierError::Config(format!("telegram credentials rejected: {e}")))?;
        info!(
            "Authorized as bot {}",
            me.username.as_deref().unwrap_or(&me.first_name)
        );

        let index = Arc::new(SqlSubscriptionIndex::new(self.db.clone()));
        let seen: Arc<dyn SeenStore> = if poll.persist_seen {
            Arc::new(SqlSeenStore::new(self.db.clone()))
        } else {
            info!("Seen-set is kept in memory and resets on restart");
            Arc::new(MemorySeenStore::new())
        };
        let fetcher = Arc::new(HttpFetcher::new(&self.config.fetch, poll.fetch_timeout())?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatcher = Dispatcher::new(
            index.clone(),
            Arc::new(telegram.clone()),
            poll.send_timeout(),
        );
        let (queue, dispatcher_handle) =
            dispatcher.spawn(poll.dispatch_queue_capacity, shutdown_rx.clone());

        let pipeline = TopicPipeline::new(fetcher, seen, queue, poll.fetch_timeout())
            .with_baseline(poll.baseline_new_topics);
        let interval = poll
            .interval()
            .ok_or_else(|| NotifierError::Config("invalid poll interval".to_string()))?;
        let scheduler = PollScheduler::new(index, pipeline, interval)
            .with_initial_delay(poll.initial_delay());
        let scheduler_handle = {
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        let bot = BotRunner::new(telegram, CommandHandler::new(self.db.clone()));
        let bot_handle = tokio::spawn(async move { bot.run(shutdown_rx).await });

        signal.await;
        info!("Shutdown requested");
        // All receivers are alive until their tasks end.
        let _ = shutdown_tx.send(true);

        for (name, handle) in [("scheduler", scheduler_handle), ("bot", bot_handle)] {
            if let Err(e) = handle.await {
                error!("{} task failed: {}", name, e);
            }
        }
        // The scheduler owned the last queue handle, so the dispatcher drains.
        if let Err(e) = dispatcher_handle.await {
            error!("dispatcher task failed: {}", e);
        }

        self.db.pool().close().await;
        info!("Notifier stopped");
        Ok(())
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
