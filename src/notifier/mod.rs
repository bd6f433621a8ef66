//! Document-feed notifier core.
//!
//! Topics are polled on a fixed interval. Each poll fetches the topic's
//! document listing, diffs it against the per-topic seen-set and hands the
//! new documents to the dispatcher, which messages every subscriber.

mod dispatcher;
mod document;
mod fetcher;
mod index;
mod scheduler;
mod seen;

#[cfg(test)]
mod testing;

pub use dispatcher::{DispatchQueue, DispatchReport, Dispatcher, MessageSender};
pub use document::{Document, DocumentKey, MISSING_TITLE, RENDER_LANGUAGE};
pub use fetcher::{parse_listing, validate_url, Fetcher, HttpFetcher, ListingSelectors};
pub use index::{SqlSubscriptionIndex, SubscriptionIndex};
pub use scheduler::{PollOutcome, PollScheduler, TickSummary, TopicPipeline};
pub use seen::{MemorySeenStore, SeenStore, SqlSeenStore};
