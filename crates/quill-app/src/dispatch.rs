//! The agent's tool dispatch site.
//!
//! Tool hooks fire here and nowhere else, exactly once per tool call: the
//! before-pipeline may rewrite the arguments, the after-pipeline may
//! rewrite the result, and a hook failure converts the call into an error
//! response.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use quill_core::tool::{AgentTool, ToolCall, ToolResponse, ToolSet};
use quill_extensions::hooks::{
    AgentFinishInput, AgentStartInput, AgentStepInput, ToolHookInput, ToolHookResult,
};
use quill_extensions::ExtensionRegistry;

/// Dispatches agent tool calls through the extension hook pipelines.
pub struct ToolDispatcher {
    registry: Arc<ExtensionRegistry>,
    tools: ToolSet,
}

impl ToolDispatcher {
    /// Build the dispatch table from built-in tools plus every
    /// extension-contributed tool currently loaded.
    pub async fn new(
        registry: Arc<ExtensionRegistry>,
        builtin_tools: Vec<Arc<dyn AgentTool>>,
    ) -> Self {
        let mut tools = ToolSet::new();
        for tool in builtin_tools {
            tools.register(tool);
        }
        for tool in registry.extension_tools().await {
            tools.register(tool);
        }
        Self { registry, tools }
    }

    /// Tool definitions for the LLM request.
    pub fn tool_definitions(&self) -> Vec<serde_json::Value> {
        self.tools.to_llm_tools()
    }

    /// Names of all dispatchable tools.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.list()
    }

    /// Execute one tool call.
    ///
    /// Before-hooks run first and may rewrite the arguments; their error
    /// aborts the call without invoking the tool. After-hooks run on the
    /// produced result; their error fails the call, but the tool's side
    /// effects have already happened and its output is carried in the
    /// error response.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        tool_name: &str,
        call: ToolCall,
    ) -> ToolResponse {
        let arguments = parse_arguments(&call.input);
        let input = ToolHookInput {
            tool_name: tool_name.to_string(),
            session_id: call.session_id.clone(),
            message_id: call.message_id.clone(),
            tool_call_id: call.id.clone(),
            arguments,
        };

        let final_args = match self
            .registry
            .trigger_tool_execute_before(cancel, input.clone())
            .await
        {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "Tool call aborted by before-hook");
                return ToolResponse::error(format!("Tool call aborted: {e:#}"));
            }
        };

        let call = ToolCall {
            input: serde_json::Value::Object(final_args.clone()).to_string(),
            ..call
        };

        info!(tool = %tool_name, "Executing tool");
        let response = match self.tools.get(tool_name) {
            Some(tool) => match tool.run(call).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(tool = %tool_name, error = %e, "Tool execution error");
                    ToolResponse::error(format!("Tool error: {e:#}"))
                }
            },
            None => ToolResponse::error(format!("Unknown tool: {tool_name}")),
        };

        let input = ToolHookInput {
            arguments: final_args,
            ..input
        };
        let hook_result = ToolHookResult {
            output: response.content.clone(),
            error: response.is_error.then(|| response.content.clone()),
            metadata: response.metadata.clone().unwrap_or_default(),
        };

        match self
            .registry
            .trigger_tool_execute_after(cancel, &input, hook_result)
            .await
        {
            Ok(threaded) => ToolResponse {
                is_error: threaded.error.is_some(),
                content: threaded.output,
                metadata: (!threaded.metadata.is_empty()).then_some(threaded.metadata),
            },
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "After-hook failed; tool already ran");
                ToolResponse::error(format!(
                    "Tool hook failed after execution: {e:#}\n\nOriginal output:\n{}",
                    response.content
                ))
            }
        }
    }
}

fn parse_arguments(input: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(input) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Fires agent lifecycle hooks from the step loop. Hook failures are
/// logged, never surfaced to the run.
pub struct AgentLifecycle {
    registry: Arc<ExtensionRegistry>,
    cancel: CancellationToken,
}

impl AgentLifecycle {
    pub fn new(registry: Arc<ExtensionRegistry>, cancel: CancellationToken) -> Self {
        Self { registry, cancel }
    }

    pub async fn started(&self, input: AgentStartInput) {
        if let Err(e) = self.registry.trigger_agent_start(&self.cancel, &input).await {
            error!(session = %input.session_id, error = %e, "Agent start hook failed");
        }
    }

    pub async fn stepped(&self, input: AgentStepInput) {
        if let Err(e) = self.registry.trigger_agent_step(&self.cancel, &input).await {
            error!(session = %input.session_id, error = %e, "Agent step hook failed");
        }
    }

    pub async fn finished(&self, input: AgentFinishInput) {
        if let Err(e) = self
            .registry
            .trigger_agent_finish(&self.cancel, &input)
            .await
        {
            error!(session = %input.session_id, error = %e, "Agent finish hook failed");
        }
    }
}
