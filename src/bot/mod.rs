//! Telegram bot: subscription commands and the outbound message channel.

mod command;
mod handler;
mod keyboard;
mod runner;
mod telegram;

pub use command::{format_help, Command};
pub use handler::{
    CommandHandler, Reply, ALREADY_SUBSCRIBED, NOT_SUBSCRIBED, SELECT_TOPICS,
    SUBSCRIPTION_STOPPED, UNKNOWN_TOPIC, UNSUBSCRIBED,
};
pub use keyboard::{topics_keyboard, Button, Keyboard, MAX_TOPIC_NAME_BYTES};
pub use runner::BotRunner;
pub use telegram::{BotUser, CallbackQuery, Chat, Message, TelegramClient, Update};
