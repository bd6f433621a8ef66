//! IPBES notifier
//!
//! Watches IPBES document listings and notifies subscribed Telegram chats
//! about newly published documents.

pub mod app;
pub mod bot;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod notifier;

pub use config::Config;
pub use db::{ChatId, Database, Topic};
pub use error::{NotifierError, Result};
pub use notifier::{Document, DocumentKey};
