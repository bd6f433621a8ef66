//! Test helpers for integration tests.
//!
//! Provides in-process fakes for the listing source and the message channel,
//! a fake Bot API server, and database setup helpers.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ipbes_notifier::config::TelegramConfig;
use ipbes_notifier::db::{ChatRepository, SubscriptionRepository, TopicRepository};
use ipbes_notifier::notifier::{Fetcher, MessageSender};
use ipbes_notifier::{ChatId, Database, Document, NotifierError, Result, Topic};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bot token accepted by [`FakeBotApi`].
pub const TEST_TOKEN: &str = "123456:test-token";

/// Open an in-memory database with the given topics.
pub async fn setup_db(topics: &[&str]) -> Database {
    let db = Database::open_in_memory().await.unwrap();
    let repo = TopicRepository::new(db.pool());
    for name in topics {
        repo.create(&Topic::new(*name, format!("https://www.ipbes.net/{name}")))
            .await
            .unwrap();
    }
    db
}

/// Register a chat and subscribe it to the given topics.
pub async fn subscribe(db: &Database, chat: ChatId, topics: &[&str]) {
    let chats = ChatRepository::new(db.pool());
    if !chats.exists(chat).await.unwrap() {
        chats.create(chat).await.unwrap();
    }
    let subscriptions = SubscriptionRepository::new(db.pool());
    for topic in topics {
        subscriptions.create(chat, topic).await.unwrap();
    }
}

pub fn doc(symbol: &str, title: &str) -> Document {
    Document::english(symbol, title)
}

/// Fetcher returning a scripted listing per topic.
#[derive(Default)]
pub struct ScriptedFetcher {
    listings: Mutex<HashMap<String, std::result::Result<Vec<Document>, String>>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, topic: &str, documents: Vec<Document>) {
        self.listings
            .lock()
            .unwrap()
            .insert(topic.to_string(), Ok(documents));
    }

    pub fn fail(&self, topic: &str, message: &str) {
        self.listings
            .lock()
            .unwrap()
            .insert(topic.to_string(), Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, topic: &Topic) -> Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let listing = self.listings.lock().unwrap().get(&topic.name).cloned();
        match listing {
            Some(Ok(documents)) => Ok(documents),
            Some(Err(message)) => Err(NotifierError::Fetch(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// Message channel that records every send.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(ChatId, String)>>,
    failing: BTreeSet<ChatId>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to these chats are recorded and then fail.
    pub fn failing_for(chats: &[ChatId]) -> Self {
        Self {
            failing: chats.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_sorted(&self) -> Vec<(ChatId, String)> {
        let mut sent = self.sent();
        sent.sort();
        sent
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, recipient: ChatId, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient, text.to_string()));
        if self.failing.contains(&recipient) {
            return Err(NotifierError::Delivery(
                "Forbidden: bot was blocked by the user".to_string(),
            ));
        }
        Ok(())
    }
}

/// A Bot API call received by [`FakeBotApi`].
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: String,
    pub body: Value,
}

#[derive(Default)]
struct FakeBotState {
    calls: Mutex<Vec<ApiCall>>,
    updates: Mutex<VecDeque<Value>>,
    blocked: Mutex<BTreeSet<ChatId>>,
    next_message_id: AtomicI64,
}

/// Local HTTP server speaking enough of the Bot API for the client.
pub struct FakeBotApi {
    addr: SocketAddr,
    state: Arc<FakeBotState>,
}

impl FakeBotApi {
    pub async fn start() -> Self {
        let state = Arc::new(FakeBotState::default());
        let app = Router::new()
            .route("/:bot/:method", post(handle_call))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this server.
    pub fn config(&self) -> TelegramConfig {
        TelegramConfig {
            token: TEST_TOKEN.to_string(),
            api_url: self.url(),
            long_poll_timeout_secs: 1,
        }
    }

    /// Queue an update for the next getUpdates call.
    pub fn push_update(&self, update: Value) {
        self.state.updates.lock().unwrap().push_back(update);
    }

    pub fn block(&self, chat: ChatId) {
        self.state.blocked.lock().unwrap().insert(chat);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .map(|call| call.body)
            .collect()
    }
}

async fn handle_call(
    State(state): State<Arc<FakeBotState>>,
    Path((bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if bot != format!("bot{TEST_TOKEN}") {
        return Json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"}));
    }

    state.calls.lock().unwrap().push(ApiCall {
        method: method.clone(),
        body: body.clone(),
    });

    let response = match method.as_str() {
        "getMe" => json!({
            "ok": true,
            "result": {"id": 1, "is_bot": true, "first_name": "IPBES", "username": "ipbes_bot"}
        }),
        "getUpdates" => {
            let updates: Vec<Value> = state.updates.lock().unwrap().drain(..).collect();
            if updates.is_empty() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            json!({"ok": true, "result": updates})
        }
        "sendMessage" => {
            let chat = body["chat_id"].as_i64().unwrap_or_default();
            if state.blocked.lock().unwrap().contains(&chat) {
                json!({
                    "ok": false,
                    "error_code": 403,
                    "description": "Forbidden: bot was blocked by the user"
                })
            } else {
                let id = state.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
                json!({
                    "ok": true,
                    "result": {"message_id": id, "chat": {"id": chat}, "text": body["text"]}
                })
            }
        }
        "editMessageText" | "editMessageReplyMarkup" | "answerCallbackQuery" => {
            json!({"ok": true, "result": true})
        }
        _ => json!({"ok": false, "error_code": 404, "description": "Not Found"}),
    };
    Json(response)
}

/// Poll `condition` until it holds or [`DEFAULT_TIMEOUT`] elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
