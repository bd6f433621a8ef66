//! Command handler.
//!
//! Maps each [`Command`] to a subscription change and the reply that goes
//! back to the chat. Nothing here talks to the network; the runner turns
//! a [`Reply`] into Bot API calls.

use tracing::{debug, info};

use super::command::{format_help, Command};
use super::keyboard::{topics_keyboard, Keyboard};
use crate::db::{ChatId, ChatRepository, Database, SubscriptionRepository, TopicRepository};
use crate::{NotifierError, Result};

pub const ALREADY_SUBSCRIBED: &str = "You are already subscribed, use /stop first";
pub const SELECT_TOPICS: &str = "Select topics to subscribe:";
pub const UNSUBSCRIBED: &str = "You are no longer subscribed, use /start to subscribe again";
pub const NOT_SUBSCRIBED: &str = "You were already not subscribed, use /start to subscribe again";
pub const SUBSCRIPTION_STOPPED: &str = "Subscription is stopped, please /start again";
pub const UNKNOWN_TOPIC: &str = "Unknown topic";

/// What to send back for a handled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A new message, optionally with an inline keyboard.
    Message {
        text: String,
        keyboard: Option<Keyboard>,
    },
    /// Replace the text of the message carrying the pressed button.
    EditText(String),
    /// Replace the keyboard of the message carrying the pressed button.
    EditKeyboard(Keyboard),
    /// A short notice shown as the answer to a button press.
    Notice(String),
}

impl Reply {
    fn text(text: &str) -> Self {
        Reply::Message {
            text: text.to_string(),
            keyboard: None,
        }
    }
}

/// Handles bot commands against the subscription database.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    db: Database,
}

impl CommandHandler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Handle a command issued in `chat`.
    ///
    /// Duplicate and missing chats are answered with a user-facing message;
    /// only database failures are returned as errors.
    pub async fn handle(&self, chat: ChatId, command: Command) -> Result<Reply> {
        debug!("Chat {}: {}", chat, command);
        match command {
            Command::Start => self.start(chat).await,
            Command::Stop => self.stop(chat).await,
            Command::Toggle(topic) => self.toggle(chat, &topic).await,
            Command::Help | Command::Unknown(_) => Ok(Reply::text(&format_help())),
        }
    }

    async fn start(&self, chat: ChatId) -> Result<Reply> {
        match ChatRepository::new(self.db.pool()).create(chat).await {
            Ok(()) => {}
            Err(NotifierError::AlreadyExists(_)) => return Ok(Reply::text(ALREADY_SUBSCRIBED)),
            Err(e) => return Err(e),
        }
        info!("Chat {} started", chat);

        Ok(Reply::Message {
            text: SELECT_TOPICS.to_string(),
            keyboard: Some(self.keyboard_for(chat).await?),
        })
    }

    async fn stop(&self, chat: ChatId) -> Result<Reply> {
        match ChatRepository::new(self.db.pool()).delete(chat).await {
            Ok(()) => {
                info!("Chat {} stopped", chat);
                Ok(Reply::text(UNSUBSCRIBED))
            }
            Err(NotifierError::NotFound(_)) => Ok(Reply::text(NOT_SUBSCRIBED)),
            Err(e) => Err(e),
        }
    }

    async fn toggle(&self, chat: ChatId, topic: &str) -> Result<Reply> {
        if !ChatRepository::new(self.db.pool()).exists(chat).await? {
            return Ok(Reply::EditText(SUBSCRIPTION_STOPPED.to_string()));
        }
        if TopicRepository::new(self.db.pool()).get(topic).await?.is_none() {
            return Ok(Reply::Notice(UNKNOWN_TOPIC.to_string()));
        }

        // The chat or topic may be removed between the checks and the toggle.
        let subscribed = match SubscriptionRepository::new(self.db.pool())
            .toggle(chat, topic)
            .await
        {
            Ok(subscribed) => subscribed,
            Err(NotifierError::NotFound(_)) => {
                return Ok(Reply::EditText(SUBSCRIPTION_STOPPED.to_string()))
            }
            Err(e) => return Err(e),
        };
        info!(
            "Chat {} {} {}",
            chat,
            if subscribed { "subscribed to" } else { "unsubscribed from" },
            topic
        );

        Ok(Reply::EditKeyboard(self.keyboard_for(chat).await?))
    }

    async fn keyboard_for(&self, chat: ChatId) -> Result<Keyboard> {
        let topics = SubscriptionRepository::new(self.db.pool())
            .topics_for_chat(chat)
            .await?;
        Ok(topics_keyboard(&topics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Topic;

    async fn setup() -> (Database, CommandHandler) {
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
        let handler = CommandHandler::new(db.clone());
        (db, handler)
    }

    fn labels(keyboard: &Keyboard) -> Vec<String> {
        keyboard.buttons().map(|b| b.text.clone()).collect()
    }

    #[tokio::test]
    async fn test_start_shows_keyboard() {
        let (_db, handler) = setup().await;
        let reply = handler.handle(1, Command::Start).await.unwrap();

        match reply {
            Reply::Message {
                text,
                keyboard: Some(keyboard),
            } => {
                assert_eq!(text, SELECT_TOPICS);
                assert_eq!(labels(&keyboard), vec!["✗ biodiversity", "✗ climate"]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_twice() {
        let (_db, handler) = setup().await;
        handler.handle(1, Command::Start).await.unwrap();
        let reply = handler.handle(1, Command::Start).await.unwrap();
        assert_eq!(reply, Reply::text(ALREADY_SUBSCRIBED));
    }

    #[tokio::test]
    async fn test_stop() {
        let (db, handler) = setup().await;
        handler.handle(1, Command::Start).await.unwrap();
        handler
            .handle(1, Command::Toggle("biodiversity".into()))
            .await
            .unwrap();

        let reply = handler.handle(1, Command::Stop).await.unwrap();
        assert_eq!(reply, Reply::text(UNSUBSCRIBED));
        assert!(SubscriptionRepository::new(db.pool())
            .subscribers_of("biodiversity")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_stop_not_subscribed() {
        let (_db, handler) = setup().await;
        let reply = handler.handle(1, Command::Stop).await.unwrap();
        assert_eq!(reply, Reply::text(NOT_SUBSCRIBED));
    }

    #[tokio::test]
    async fn test_toggle_flips_subscription() {
        let (db, handler) = setup().await;
        handler.handle(7, Command::Start).await.unwrap();

        let reply = handler
            .handle(7, Command::Toggle("climate".into()))
            .await
            .unwrap();
        match reply {
            Reply::EditKeyboard(keyboard) => {
                assert_eq!(labels(&keyboard), vec!["✗ biodiversity", "✓ climate"]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(
            SubscriptionRepository::new(db.pool())
                .subscribers_of("climate")
                .await
                .unwrap(),
            vec![7]
        );

        handler
            .handle(7, Command::Toggle("climate".into()))
            .await
            .unwrap();
        assert!(!SubscriptionRepository::new(db.pool())
            .exists(7, "climate")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_toggle_without_start() {
        let (_db, handler) = setup().await;
        let reply = handler
            .handle(7, Command::Toggle("climate".into()))
            .await
            .unwrap();
        assert_eq!(reply, Reply::EditText(SUBSCRIPTION_STOPPED.to_string()));
    }

    #[tokio::test]
    async fn test_toggle_unknown_topic() {
        let (_db, handler) = setup().await;
        handler.handle(7, Command::Start).await.unwrap();
        let reply = handler
            .handle(7, Command::Toggle("oceans".into()))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Notice(UNKNOWN_TOPIC.to_string()));
    }

    #[tokio::test]
    async fn test_help_and_unknown() {
        let (_db, handler) = setup().await;
        let help = handler.handle(1, Command::Help).await.unwrap();
        let unknown = handler
            .handle(1, Command::Unknown("hi".into()))
            .await
            .unwrap();
        assert_eq!(help, unknown);
        assert_eq!(help, Reply::text(&format_help()));
    }
}
