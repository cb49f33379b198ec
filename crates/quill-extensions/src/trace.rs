//! Built-in trace extension — logs agent lifecycle and tool execution
//! events via `tracing`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::hooks::{
    AgentFinishInput, AgentHook, AgentStartInput, AgentStepInput, HookSet, ToolHook,
    ToolHookInput,
};
use crate::{Extension, ExtensionContext, ExtensionInfo};

/// Observes agent and tool activity for debugging and demonstration.
pub struct TraceExtension;

#[async_trait]
impl Extension for TraceExtension {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo {
            name: "quill-trace".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Logs agent lifecycle and tool execution events".into(),
            author: "Quill".into(),
        }
    }

    async fn init(&self, _ctx: &ExtensionContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn hooks(&self) -> HookSet {
        HookSet::new()
            .with_agent(Arc::new(TraceAgentHook))
            .with_tool(Arc::new(TraceToolHook))
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct TraceAgentHook;

#[async_trait]
impl AgentHook for TraceAgentHook {
    async fn on_agent_start(
        &self,
        _cancel: &CancellationToken,
        input: &AgentStartInput,
    ) -> anyhow::Result<()> {
        tracing::info!(
            session = %input.session_id,
            model = %input.model,
            provider = %input.provider,
            "Agent run starting"
        );
        Ok(())
    }

    async fn on_agent_step(
        &self,
        _cancel: &CancellationToken,
        input: &AgentStepInput,
    ) -> anyhow::Result<()> {
        tracing::debug!(
            session = %input.session_id,
            step = input.step_number,
            tool_calls = input.tool_calls.len(),
            "Agent step"
        );
        Ok(())
    }

    async fn on_agent_finish(
        &self,
        _cancel: &CancellationToken,
        input: &AgentFinishInput,
    ) -> anyhow::Result<()> {
        tracing::info!(
            session = %input.session_id,
            steps = input.total_steps,
            errored = input.error.is_some(),
            "Agent run completed"
        );
        Ok(())
    }
}

struct TraceToolHook;

#[async_trait]
impl ToolHook for TraceToolHook {
    async fn on_tool_execute_before(
        &self,
        _cancel: &CancellationToken,
        input: &ToolHookInput,
    ) -> anyhow::Result<Option<serde_json::Map<String, serde_json::Value>>> {
        tracing::info!(
            session = %input.session_id,
            tool = %input.tool_name,
            "Tool executing"
        );
        Ok(None)
    }

    async fn on_tool_execute_after(
        &self,
        _cancel: &CancellationToken,
        input: &ToolHookInput,
        result: &crate::hooks::ToolHookResult,
    ) -> anyhow::Result<Option<crate::hooks::ToolHookResult>> {
        tracing::info!(
            session = %input.session_id,
            tool = %input.tool_name,
            errored = result.error.is_some(),
            "Tool finished"
        );
        Ok(None)
    }
}
