//! Permission requests and the interactive permission service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tokio_stream::wrappers::BroadcastStream;

use crate::pubsub::{Broker, Event, EventType};

/// Decision returned by an automated permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Allow,
    Deny,
}

/// A permission request issued at a tool decision point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermissionRequest {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub description: String,
    pub action: String,
    pub params: serde_json::Value,
    pub path: String,
}

/// A pending request surfaced to the interactive prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: String,
    #[serde(flatten)]
    pub request: CreatePermissionRequest,
    pub created_at: DateTime<Utc>,
}

/// Permission checkpoint service.
///
/// `request` resolves to whether the tool call may proceed. How a request
/// is resolved (auto-rules, extension hooks, interactive prompt) is up to
/// the implementation and the host wiring around it.
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn request(&self, req: CreatePermissionRequest) -> bool;

    /// Grant every future request in the given session without prompting.
    async fn auto_approve_session(&self, session_id: &str);

    /// Resolve a pending interactive request.
    async fn grant(&self, request_id: &str, allow: bool);

    /// Subscribe to pending interactive requests.
    fn subscribe(&self) -> BroadcastStream<Event<PermissionRequest>>;
}

/// Default permission service: auto-rules first, then an interactive
/// prompt published over pub/sub and resolved via [`PermissionService::grant`].
pub struct InteractivePermissionService {
    skip_requests: bool,
    allowed_tools: HashSet<String>,
    auto_approved_sessions: Mutex<HashSet<String>>,
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    broker: Broker<PermissionRequest>,
}

impl InteractivePermissionService {
    pub fn new(skip_requests: bool, allowed_tools: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            skip_requests,
            allowed_tools: allowed_tools.into_iter().collect(),
            auto_approved_sessions: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            broker: Broker::new(),
        })
    }
}

#[async_trait]
impl PermissionService for InteractivePermissionService {
    async fn request(&self, req: CreatePermissionRequest) -> bool {
        if self.skip_requests {
            return true;
        }
        if self.allowed_tools.contains(&req.tool_name) {
            return true;
        }
        if self
            .auto_approved_sessions
            .lock()
            .await
            .contains(&req.session_id)
        {
            return true;
        }

        // Fall through to the interactive prompt.
        let (tx, rx) = oneshot::channel();
        let pending = PermissionRequest {
            id: uuid::Uuid::new_v4().to_string(),
            request: req,
            created_at: Utc::now(),
        };
        self.pending.lock().await.insert(pending.id.clone(), tx);
        self.broker.publish(EventType::Created, pending);

        // A dropped prompt counts as denial.
        rx.await.unwrap_or(false)
    }

    async fn auto_approve_session(&self, session_id: &str) {
        self.auto_approved_sessions
            .lock()
            .await
            .insert(session_id.to_string());
    }

    async fn grant(&self, request_id: &str, allow: bool) {
        if let Some(tx) = self.pending.lock().await.remove(request_id) {
            let _ = tx.send(allow);
        }
    }

    fn subscribe(&self) -> BroadcastStream<Event<PermissionRequest>> {
        self.broker.subscribe()
    }
}
