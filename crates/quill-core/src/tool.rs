//! Agent-facing tool surface.
//!
//! Tools are capabilities exposed to the LLM during agent runs. Built-in
//! tools and extension-contributed tools all present the same [`AgentTool`]
//! interface to the agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Describes a tool to the model: name, prose, and parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped parameter description.
    pub parameters: serde_json::Value,
    /// Names of required parameters.
    #[serde(default)]
    pub required: Vec<String>,
}

/// One tool invocation as issued by the agent.
///
/// `input` is the raw JSON argument payload; tools parse what they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub input: String,
}

/// Outcome of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub content: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ToolResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: None,
        }
    }
}

/// The tool interface the agent dispatches against.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn run(&self, call: ToolCall) -> anyhow::Result<ToolResponse>;

    /// Provider-specific options attached to the tool definition.
    fn provider_options(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }
}

/// The agent's current tool set.
#[derive(Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.iter().find(|t| t.descriptor().name == name)
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.descriptor().name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate tool definitions for the LLM API request.
    pub fn to_llm_tools(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|t| {
                let d = t.descriptor();
                serde_json::json!({
                    "name": d.name,
                    "description": d.description,
                    "input_schema": d.parameters,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl AgentTool for EchoTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".into(),
                description: "Echoes its input back".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
                required: vec![],
            }
        }

        async fn run(&self, call: ToolCall) -> anyhow::Result<ToolResponse> {
            Ok(ToolResponse::text(call.input))
        }
    }

    #[tokio::test]
    async fn test_register_and_run() {
        let mut set = ToolSet::new();
        set.register(Arc::new(EchoTool));

        let tool = set.get("echo").unwrap();
        let response = tool
            .run(ToolCall {
                id: "c1".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                input: r#"{"x":1}"#.into(),
            })
            .await
            .unwrap();

        assert!(!response.is_error);
        assert_eq!(response.content, r#"{"x":1}"#);
    }

    #[test]
    fn test_llm_tool_definitions() {
        let mut set = ToolSet::new();
        set.register(Arc::new(EchoTool));

        let defs = set.to_llm_tools();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["name"], "echo");
        assert!(defs[0]["input_schema"].is_object());
    }
}
