//! Tool bridge — adapts extension-contributed tools to the agent's tool
//! interface.
//!
//! The bridge only contributes tools; it never invokes the registry's tool
//! hooks. Those fire at the agent's dispatch site, exactly once per call.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use quill_core::tool::{AgentTool, ToolCall, ToolDescriptor, ToolResponse};

use crate::registry::ExtensionRegistry;

/// A tool contributed by an extension.
///
/// Mirrors the agent's tool interface minus provider plumbing; the bridge
/// supplies the rest.
#[async_trait]
pub trait ExtensionTool: Send + Sync {
    /// Metadata about the tool.
    fn info(&self) -> ToolDescriptor;

    /// Execute the tool with the given call.
    async fn run(&self, call: ToolCall) -> anyhow::Result<ToolResponse>;
}

/// Adapts an [`ExtensionTool`] to the agent's [`AgentTool`] interface.
struct ExtensionToolAdapter {
    tool: Arc<dyn ExtensionTool>,
    provider_options: serde_json::Map<String, serde_json::Value>,
}

impl ExtensionToolAdapter {
    fn new(tool: Arc<dyn ExtensionTool>) -> Self {
        Self {
            tool,
            provider_options: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl AgentTool for ExtensionToolAdapter {
    fn descriptor(&self) -> ToolDescriptor {
        self.tool.info()
    }

    async fn run(&self, call: ToolCall) -> anyhow::Result<ToolResponse> {
        self.tool.run(call).await
    }

    fn provider_options(&self) -> serde_json::Map<String, serde_json::Value> {
        self.provider_options.clone()
    }
}

impl ExtensionRegistry {
    /// Collect all tools contributed by loaded extensions, wrapped for the
    /// agent's tool registry.
    ///
    /// Extensions are walked in load order; on a duplicate tool name the
    /// first-registered tool wins and the collision is logged.
    pub async fn extension_tools(&self) -> Vec<Arc<dyn AgentTool>> {
        let mut tools: Vec<Arc<dyn AgentTool>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for extension in self.extensions_in_order().await {
            let name = extension.info().name;
            for tool in extension.tools() {
                let tool_name = tool.info().name;
                if !seen.insert(tool_name.clone()) {
                    tracing::warn!(
                        extension = %name,
                        tool = %tool_name,
                        "Duplicate tool name, keeping the first-registered tool"
                    );
                    continue;
                }
                tools.push(Arc::new(ExtensionToolAdapter::new(tool)));
            }
        }

        tools
    }
}
