//! Message model and service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::error::{QuillError, Result};
use crate::pubsub::{Broker, Event, EventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A message within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    /// Content parts; text and tool-call payloads as structured JSON.
    pub parts: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message persistence and change notification.
#[async_trait]
pub trait MessageService: Send + Sync {
    async fn create(&self, session_id: &str, role: Role, parts: Vec<serde_json::Value>)
        -> Result<Message>;
    async fn update(&self, message: Message) -> Result<Message>;
    async fn list(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Subscribe to message lifecycle events.
    fn subscribe(&self) -> BroadcastStream<Event<Message>>;
}

/// In-memory message service.
pub struct InMemoryMessageService {
    messages: RwLock<HashMap<String, Message>>,
    broker: Broker<Message>,
}

impl InMemoryMessageService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: RwLock::new(HashMap::new()),
            broker: Broker::new(),
        })
    }
}

#[async_trait]
impl MessageService for InMemoryMessageService {
    async fn create(
        &self,
        session_id: &str,
        role: Role,
        parts: Vec<serde_json::Value>,
    ) -> Result<Message> {
        let now = Utc::now();
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            parts,
            created_at: now,
            updated_at: now,
        };

        self.messages
            .write()
            .await
            .insert(message.id.clone(), message.clone());
        debug!(message_id = %message.id, session_id = %message.session_id, "Message created");
        self.broker.publish(EventType::Created, message.clone());
        Ok(message)
    }

    async fn update(&self, mut message: Message) -> Result<Message> {
        message.updated_at = Utc::now();

        let mut messages = self.messages.write().await;
        if !messages.contains_key(&message.id) {
            return Err(QuillError::Message(format!(
                "message {} not found",
                message.id
            )));
        }
        messages.insert(message.id.clone(), message.clone());
        drop(messages);

        self.broker.publish(EventType::Updated, message.clone());
        Ok(message)
    }

    async fn list(&self, session_id: &str) -> Result<Vec<Message>> {
        let mut out: Vec<Message> = self
            .messages
            .read()
            .await
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    fn subscribe(&self) -> BroadcastStream<Event<Message>> {
        self.broker.subscribe()
    }
}
