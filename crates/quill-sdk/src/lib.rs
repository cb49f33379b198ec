//! Public SDK for developing Quill extensions.
//!
//! Re-exports the contract types and offers helpers that make simple
//! extensions short to write: [`SimpleExtension`] handles the lifecycle
//! boilerplate, [`SimpleTool`] wraps a closure as a tool, and the
//! permission helpers name the three possible hook outcomes.
//!
//! A loadable artifact exports its constructor with
//! [`export_extension!`](quill_extensions::export_extension):
//!
//! ```ignore
//! use quill_sdk::*;
//!
//! fn create() -> Box<dyn Extension> {
//!     let mut ext = SimpleExtension::new(ExtensionInfo {
//!         name: "hello-world".into(),
//!         version: "1.0.0".into(),
//!         description: "Adds a hello tool".into(),
//!         author: "Examples".into(),
//!     });
//!     ext.add_tool(Arc::new(SimpleTool::new(
//!         "hello",
//!         "Says hello to the given person",
//!         serde_json::json!({"type": "object", "properties": {"name": {"type": "string"}}}),
//!         vec!["name".into()],
//!         |call| Box::pin(async move { Ok(ToolResponse::text("Hey!")) }),
//!     )));
//!     Box::new(ext)
//! }
//! quill_extensions::export_extension!(create);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

pub use quill_core::permission::{CreatePermissionRequest, PermissionDecision};
pub use quill_core::tool::{ToolCall, ToolDescriptor, ToolResponse};
pub use quill_extensions::hooks::{
    AgentFinishInput, AgentHook, AgentStartInput, AgentStepInput, ConfigHook, MessageHook,
    PermissionHook, SessionHook, ToolHook, ToolHookInput, ToolHookResult,
};
pub use quill_extensions::{
    export_extension, Extension, ExtensionContext, ExtensionDecl, ExtensionInfo, ExtensionTool,
    HookSet, API_VERSION,
};

/// Permission helper: auto-approve the request.
pub fn allow() -> Option<PermissionDecision> {
    Some(PermissionDecision::Allow)
}

/// Permission helper: auto-deny the request.
pub fn deny() -> Option<PermissionDecision> {
    Some(PermissionDecision::Deny)
}

/// Permission helper: let another hook or the user decide.
pub fn no_decision() -> Option<PermissionDecision> {
    None
}

/// A base extension implementation handling the plain lifecycle, so an
/// extension can focus on its hooks and tools.
pub struct SimpleExtension {
    info: ExtensionInfo,
    hooks: HookSet,
    tools: Vec<Arc<dyn ExtensionTool>>,
}

impl SimpleExtension {
    pub fn new(info: ExtensionInfo) -> Self {
        Self {
            info,
            hooks: HookSet::new(),
            tools: Vec::new(),
        }
    }

    /// Replace the hook set.
    pub fn set_hooks(&mut self, hooks: HookSet) {
        self.hooks = hooks;
    }

    /// Add a tool contributed by this extension.
    pub fn add_tool(&mut self, tool: Arc<dyn ExtensionTool>) {
        self.tools.push(tool);
    }
}

#[async_trait]
impl Extension for SimpleExtension {
    fn info(&self) -> ExtensionInfo {
        self.info.clone()
    }

    async fn init(&self, _ctx: &ExtensionContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn hooks(&self) -> HookSet {
        self.hooks.clone()
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn ExtensionTool>> {
        self.tools.clone()
    }
}

/// Handler signature for [`SimpleTool`].
pub type ToolHandler = Box<
    dyn Fn(ToolCall) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResponse>> + Send>>
        + Send
        + Sync,
>;

/// A tool built from a descriptor and an async closure.
pub struct SimpleTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

impl SimpleTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        required: Vec<String>,
        handler: impl Fn(ToolCall) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResponse>> + Send>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: name.into(),
                description: description.into(),
                parameters,
                required,
            },
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl ExtensionTool for SimpleTool {
    fn info(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn run(&self, call: ToolCall) -> anyhow::Result<ToolResponse> {
        (self.handler)(call).await
    }
}
