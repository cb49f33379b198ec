//! Hook groups — the typed callback surface extensions implement.
//!
//! Six independent groups cover the host lifecycle: configuration,
//! sessions, messages, permissions, tool execution, and agent stepping.
//! Every method has a no-op default body, so an extension implements a
//! group's trait and overrides only the events it cares about.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use quill_core::config::Config;
use quill_core::message::Message;
use quill_core::permission::{CreatePermissionRequest, PermissionDecision};
use quill_core::session::Session;
use quill_core::tool::ToolCall;

/// Configuration hook — runs once after the host parses configuration,
/// before any service consumes it.
#[async_trait]
pub trait ConfigHook: Send + Sync {
    /// Extensions may mutate the configuration in place. An error aborts
    /// startup.
    async fn on_config_load(
        &self,
        cancel: &CancellationToken,
        config: &mut Config,
    ) -> anyhow::Result<()> {
        let _ = (cancel, config);
        Ok(())
    }
}

/// Session lifecycle hooks. Errors are recorded and logged; they do not
/// abort the originating operation.
#[async_trait]
pub trait SessionHook: Send + Sync {
    async fn on_session_created(
        &self,
        cancel: &CancellationToken,
        session: &Session,
    ) -> anyhow::Result<()> {
        let _ = (cancel, session);
        Ok(())
    }

    async fn on_session_updated(
        &self,
        cancel: &CancellationToken,
        session: &Session,
    ) -> anyhow::Result<()> {
        let _ = (cancel, session);
        Ok(())
    }

    async fn on_session_deleted(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> anyhow::Result<()> {
        let _ = (cancel, session_id);
        Ok(())
    }
}

/// Message lifecycle hooks.
#[async_trait]
pub trait MessageHook: Send + Sync {
    async fn on_message_created(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> anyhow::Result<()> {
        let _ = (cancel, message);
        Ok(())
    }

    async fn on_message_updated(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> anyhow::Result<()> {
        let _ = (cancel, message);
        Ok(())
    }
}

/// Permission hook — consulted before prompting the user.
#[async_trait]
pub trait PermissionHook: Send + Sync {
    /// Return `Some(Allow)` to auto-approve, `Some(Deny)` to auto-deny,
    /// or `None` to let another hook or the user decide. An error fails
    /// the permission request.
    async fn on_permission_request(
        &self,
        cancel: &CancellationToken,
        request: &CreatePermissionRequest,
    ) -> anyhow::Result<Option<PermissionDecision>> {
        let _ = (cancel, request);
        Ok(None)
    }
}

/// Information about a tool execution, handed to tool hooks.
#[derive(Debug, Clone)]
pub struct ToolHookInput {
    pub tool_name: String,
    pub session_id: String,
    pub message_id: String,
    pub tool_call_id: String,
    /// Input arguments to the tool as a JSON object.
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Result of a tool execution, handed to after-hooks.
#[derive(Debug, Clone, Default)]
pub struct ToolHookResult {
    pub output: String,
    pub error: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Tool execution hooks.
#[async_trait]
pub trait ToolHook: Send + Sync {
    /// Called before a tool executes. Returning `Some(args)` replaces the
    /// arguments for subsequent hooks and for the tool itself; `None`
    /// leaves them unchanged. An error aborts the tool call.
    async fn on_tool_execute_before(
        &self,
        cancel: &CancellationToken,
        input: &ToolHookInput,
    ) -> anyhow::Result<Option<serde_json::Map<String, serde_json::Value>>> {
        let _ = (cancel, input);
        Ok(None)
    }

    /// Called after a tool has executed. Returning `Some(result)` replaces
    /// the result for subsequent hooks and for the caller; `None` leaves
    /// it unchanged. An error fails the call — the tool's side effects
    /// have already occurred at that point.
    async fn on_tool_execute_after(
        &self,
        cancel: &CancellationToken,
        input: &ToolHookInput,
        result: &ToolHookResult,
    ) -> anyhow::Result<Option<ToolHookResult>> {
        let _ = (cancel, input, result);
        Ok(None)
    }
}

/// Information about an agent starting a run.
#[derive(Debug, Clone)]
pub struct AgentStartInput {
    pub session_id: String,
    pub prompt: String,
    pub model: String,
    pub provider: String,
}

/// Information about one step of agent execution.
#[derive(Debug, Clone)]
pub struct AgentStepInput {
    pub session_id: String,
    pub step_number: u32,
    pub tool_calls: Vec<ToolCall>,
    pub response: String,
}

/// Information about an agent completing a run.
#[derive(Debug, Clone)]
pub struct AgentFinishInput {
    pub session_id: String,
    pub total_steps: u32,
    /// The final assistant response, if the run produced one.
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Agent lifecycle hooks. Observational only; errors are logged.
#[async_trait]
pub trait AgentHook: Send + Sync {
    async fn on_agent_start(
        &self,
        cancel: &CancellationToken,
        input: &AgentStartInput,
    ) -> anyhow::Result<()> {
        let _ = (cancel, input);
        Ok(())
    }

    async fn on_agent_step(
        &self,
        cancel: &CancellationToken,
        input: &AgentStepInput,
    ) -> anyhow::Result<()> {
        let _ = (cancel, input);
        Ok(())
    }

    async fn on_agent_finish(
        &self,
        cancel: &CancellationToken,
        input: &AgentFinishInput,
    ) -> anyhow::Result<()> {
        let _ = (cancel, input);
        Ok(())
    }
}

/// The hook implementations an extension provides, one optional slot per
/// group. An empty slot means the group is not implemented and nothing is
/// appended to that pipeline.
#[derive(Default, Clone)]
pub struct HookSet {
    pub config: Option<Arc<dyn ConfigHook>>,
    pub session: Option<Arc<dyn SessionHook>>,
    pub message: Option<Arc<dyn MessageHook>>,
    pub permission: Option<Arc<dyn PermissionHook>>,
    pub tool: Option<Arc<dyn ToolHook>>,
    pub agent: Option<Arc<dyn AgentHook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, hook: Arc<dyn ConfigHook>) -> Self {
        self.config = Some(hook);
        self
    }

    pub fn with_session(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.session = Some(hook);
        self
    }

    pub fn with_message(mut self, hook: Arc<dyn MessageHook>) -> Self {
        self.message = Some(hook);
        self
    }

    pub fn with_permission(mut self, hook: Arc<dyn PermissionHook>) -> Self {
        self.permission = Some(hook);
        self
    }

    pub fn with_tool(mut self, hook: Arc<dyn ToolHook>) -> Self {
        self.tool = Some(hook);
        self
    }

    pub fn with_agent(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.agent = Some(hook);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DefaultOnly;
    impl PermissionHook for DefaultOnly {}
    impl SessionHook for DefaultOnly {}

    #[tokio::test]
    async fn test_default_permission_hook_returns_no_decision() {
        let hook = DefaultOnly;
        let cancel = CancellationToken::new();
        let request = CreatePermissionRequest {
            session_id: "s1".into(),
            tool_call_id: "c1".into(),
            tool_name: "view".into(),
            description: String::new(),
            action: "read".into(),
            params: serde_json::json!({}),
            path: "/".into(),
        };
        let decision = hook.on_permission_request(&cancel, &request).await.unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_default_session_hook_is_noop() {
        let hook = DefaultOnly;
        let cancel = CancellationToken::new();
        hook.on_session_deleted(&cancel, "s1").await.unwrap();
    }

    #[test]
    fn test_empty_hook_set_has_no_slots() {
        let set = HookSet::new();
        assert!(set.config.is_none());
        assert!(set.session.is_none());
        assert!(set.message.is_none());
        assert!(set.permission.is_none());
        assert!(set.tool.is_none());
        assert!(set.agent.is_none());
    }
}
