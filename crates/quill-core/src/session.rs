//! Session model and service.

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

/// A conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session persistence and change notification.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create(&self, title: &str) -> Result<Session>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn update(&self, session: Session) -> Result<Session>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<Session>>;

    /// Subscribe to session lifecycle events.
    fn subscribe(&self) -> BroadcastStream<Event<Session>>;
}

/// In-memory session service.
///
/// Stands in for the persistent store; same mutate/subscribe surface.
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<String, Session>>,
    broker: Broker<Session>,
}

impl InMemorySessionService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            broker: Broker::new(),
        })
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create(&self, title: &str) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            parent_session_id: None,
            title: title.to_string(),
            message_count: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            created_at: now,
            updated_at: now,
        };

        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session created");
        self.broker.publish(EventType::Created, session.clone());
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn update(&self, mut session: Session) -> Result<Session> {
        session.updated_at = Utc::now();

        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.id) {
            return Err(QuillError::Session(format!(
                "session {} not found",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session.clone());
        drop(sessions);

        self.broker.publish(EventType::Updated, session.clone());
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                debug!(session_id = %session.id, "Session deleted");
                self.broker.publish(EventType::Deleted, session);
                Ok(())
            }
            None => Err(QuillError::Session(format!("session {id} not found"))),
        }
    }

    async fn list(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.read().await.values().cloned().collect())
    }

    fn subscribe(&self) -> BroadcastStream<Event<Session>> {
        self.broker.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_create_and_get() {
        let svc = InMemorySessionService::new();
        let session = svc.create("test session").await.unwrap();
        let loaded = svc.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "test session");
    }

    #[tokio::test]
    async fn test_create_publishes_event() {
        let svc = InMemorySessionService::new();
        let mut events = svc.subscribe();

        let session = svc.create("observed").await.unwrap();

        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Created);
        assert_eq!(event.payload.id, session.id);
    }

    #[tokio::test]
    async fn test_delete_publishes_event() {
        let svc = InMemorySessionService::new();
        let session = svc.create("doomed").await.unwrap();

        let mut events = svc.subscribe();
        svc.delete(&session.id).await.unwrap();

        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Deleted);
        assert!(svc.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_session_fails() {
        let svc = InMemorySessionService::new();
        let session = svc.create("known").await.unwrap();
        svc.delete(&session.id).await.unwrap();

        let result = svc.update(session).await;
        assert!(result.is_err());
    }
}
