//! Long-polling bot loop.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::command::Command;
use super::handler::{CommandHandler, Reply};
use super::telegram::{CallbackQuery, Message, TelegramClient, Update};
use crate::Result;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Receives bot updates and routes them to the command handler.
pub struct BotRunner {
    client: TelegramClient,
    handler: CommandHandler,
}

impl BotRunner {
    pub fn new(client: TelegramClient, handler: CommandHandler) -> Self {
        Self { client, handler }
    }

    /// Poll for updates until `shutdown` is set to true.
    ///
    /// Transport errors are logged and retried with exponential backoff.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Bot started");
        let mut offset = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.client.get_updates(offset) => result,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(updates) => {
                    backoff = INITIAL_BACKOFF;
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Err(e) = self.handle_update(update).await {
                            warn!("Failed to handle update: {}", e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to get updates, retrying in {:?}: {}", backoff, e);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        info!("Bot stopped");
    }

    /// Handle a single update.
    pub async fn handle_update(&self, update: Update) -> Result<()> {
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        debug!("Ignoring update {}", update.update_id);
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let chat = message.chat.id;
        let command = Command::parse(text);
        if !command.is_command() {
            debug!("Chat {}: ignoring plain message", chat);
            return Ok(());
        }
        let reply = self.handler.handle(chat, command).await?;

        match reply {
            Reply::Message { text, keyboard } => {
                self.client
                    .send_message(chat, &text, keyboard.as_ref())
                    .await?;
            }
            Reply::EditText(text) | Reply::Notice(text) => {
                self.client.send_message(chat, &text, None).await?;
            }
            Reply::EditKeyboard(_) => debug!("Chat {}: no message to edit", chat),
        }
        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        let (Some(message), Some(data)) = (query.message.as_ref(), query.data.as_deref()) else {
            return self.client.answer_callback_query(&query.id, None).await;
        };
        let chat = message.chat.id;

        let reply = match self.handler.handle(chat, Command::from_callback(data)).await {
            Ok(reply) => reply,
            Err(e) => {
                self.client.answer_callback_query(&query.id, None).await?;
                return Err(e);
            }
        };

        let notice = match &reply {
            Reply::Notice(text) => Some(text.as_str()),
            _ => None,
        };
        self.client.answer_callback_query(&query.id, notice).await?;

        match reply {
            Reply::EditText(text) => {
                self.client
                    .edit_message_text(chat, message.message_id, &text)
                    .await
            }
            Reply::EditKeyboard(keyboard) => {
                self.client
                    .edit_message_reply_markup(chat, message.message_id, &keyboard)
                    .await
            }
            Reply::Message { text, keyboard } => self
                .client
                .send_message(chat, &text, keyboard.as_ref())
                .await
                .map(drop),
            Reply::Notice(_) => Ok(()),
        }
    }
}
