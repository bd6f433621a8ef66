//! Minimal Telegram Bot API client.
//!
//! Covers the methods the notifier needs: long polling for updates,
//! sending and editing messages, and answering button presses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::keyboard::Keyboard;
use crate::config::TelegramConfig;
use crate::db::ChatId;
use crate::notifier::MessageSender;
use crate::{NotifierError, Result};

/// Extra time allowed on top of the long-poll timeout for getUpdates.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// The bot account, as returned by getMe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// An incoming update. Kinds other than messages and button presses are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    long_poll_timeout: Duration,
}

impl TelegramClient {
    /// Create a client; `timeout` bounds every request except long polls.
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.token
            ),
            long_poll_timeout: Duration::from_secs(config.long_poll_timeout_secs),
        })
    }

    /// Check the credentials and return the bot account.
    pub async fn get_me(&self) -> Result<BotUser> {
        self.call("getMe", &json!({}), None).await
    }

    /// Long-poll for updates with an id of at least `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": self.long_poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        self.call(
            "getUpdates",
            &body,
            Some(self.long_poll_timeout + LONG_POLL_GRACE),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<Message> {
        let body = SendMessage {
            chat_id: chat,
            text,
            reply_markup: keyboard,
        };
        self.call("sendMessage", &body, None).await
    }

    pub async fn edit_message_text(&self, chat: ChatId, message_id: i64, text: &str) -> Result<()> {
        let body = json!({ "chat_id": chat, "message_id": message_id, "text": text });
        self.call::<serde_json::Value>("editMessageText", &body, None)
            .await
            .map(drop)
    }

    pub async fn edit_message_reply_markup(
        &self,
        chat: ChatId,
        message_id: i64,
        keyboard: &Keyboard,
    ) -> Result<()> {
        let body = json!({ "chat_id": chat, "message_id": message_id, "reply_markup": keyboard });
        self.call::<serde_json::Value>("editMessageReplyMarkup", &body, None)
            .await
            .map(drop)
    }

    /// Acknowledge a button press, optionally showing a short notice.
    pub async fn answer_callback_query(&self, query_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = json!({ "callback_query_id": query_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call::<bool>("answerCallbackQuery", &body, None)
            .await
            .map(drop)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Request URLs carry the token; strip them from errors.
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotifierError::Timeout(format!("{method}: {}", e.without_url()))
            } else {
                NotifierError::Delivery(format!("{method}: {}", e.without_url()))
            }
        })?;

        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await.map_err(|e| {
            NotifierError::Delivery(format!("{method}: invalid response: {}", e.without_url()))
        })?;

        if !parsed.ok {
            return Err(NotifierError::Delivery(format!(
                "{method}: {} ({})",
                parsed.description.as_deref().unwrap_or("request failed"),
                status
            )));
        }

        debug!("Bot API {} ok", method);
        parsed
            .result
            .ok_or_else(|| NotifierError::Delivery(format!("{method}: missing result")))
    }
}

#[async_trait]
impl MessageSender for TelegramClient {
    async fn send(&self, recipient: ChatId, text: &str) -> Result<()> {
        self.send_message(recipient, text, None).await.map(drop)
    }
}
