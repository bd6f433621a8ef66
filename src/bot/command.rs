//! Bot command parser.
//!
//! Turns incoming message text and inline-button payloads into [`Command`]
//! values.

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register the chat and show the topic keyboard.
    Start,
    /// Unregister the chat, dropping all its subscriptions.
    Stop,
    /// Flip the subscription to a topic (inline button press).
    Toggle(String),
    /// Show usage.
    Help,
    /// Anything else.
    Unknown(String),
}

impl Command {
    /// Parse the text of an incoming message.
    ///
    /// Commands are case-insensitive and may carry a `@botname` suffix as
    /// sent in group chats. Trailing arguments are ignored.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(without_slash) = trimmed.strip_prefix('/') else {
            return Command::Unknown(trimmed.to_string());
        };

        let word = without_slash.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("");

        match name.to_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "help" => Command::Help,
            _ => Command::Unknown(trimmed.to_string()),
        }
    }

    /// Whether the message was addressed to the bot as a `/` command.
    ///
    /// Plain chat text is not, and gets no reply.
    pub fn is_command(&self) -> bool {
        match self {
            Command::Unknown(text) => text.starts_with('/'),
            _ => true,
        }
    }

    /// Build a command from inline-button callback data.
    pub fn from_callback(data: &str) -> Self {
        Command::Toggle(data.to_string())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start => write!(f, "/start"),
            Command::Stop => write!(f, "/stop"),
            Command::Toggle(topic) => write!(f, "toggle {topic}"),
            Command::Help => write!(f, "/help"),
            Command::Unknown(text) => write!(f, "{text}"),
        }
    }
}

/// Usage text shown for /help and unrecognized commands.
pub fn format_help() -> String {
    [
        "This bot notifies you about new IPBES documents.",
        "",
        "/start - choose topics to subscribe to",
        "/stop - unsubscribe from everything",
        "/help - show this message",
    ]
    .join("\n")
}
