//! Example Quill extension.
//!
//! Demonstrates the two most common extension shapes: contributing a tool
//! (`hello`) and auto-approving permission requests for read-only tools.
//!
//! Build with `cargo build -p hello-extension`, then point the `plugins`
//! config key at the produced dynamic library:
//!
//! ```json5
//! { "plugins": ["./target/debug/libhello_extension.so"] }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use quill_sdk::{
    allow, no_decision, CreatePermissionRequest, Extension, ExtensionInfo, HookSet,
    PermissionDecision, PermissionHook, SimpleExtension, SimpleTool, ToolResponse,
};

struct ReadOnlyApprover {
    read_only_tools: HashSet<&'static str>,
}

#[async_trait]
impl PermissionHook for ReadOnlyApprover {
    async fn on_permission_request(
        &self,
        _cancel: &CancellationToken,
        request: &CreatePermissionRequest,
    ) -> anyhow::Result<Option<PermissionDecision>> {
        if self.read_only_tools.contains(request.tool_name.as_str()) {
            return Ok(allow());
        }
        if request.action.to_lowercase().contains("read") {
            return Ok(allow());
        }
        Ok(no_decision())
    }
}

fn create() -> Box<dyn Extension> {
    let mut ext = SimpleExtension::new(ExtensionInfo {
        name: "hello-world".into(),
        version: "1.0.0".into(),
        description: "Adds a hello tool and auto-approves read-only tools".into(),
        author: "Quill Examples".into(),
    });

    ext.set_hooks(HookSet::new().with_permission(Arc::new(ReadOnlyApprover {
        read_only_tools: HashSet::from(["view", "glob", "grep", "ls", "fetch"]),
    })));

    ext.add_tool(Arc::new(SimpleTool::new(
        "hello",
        "Says hello to the specified person. A demonstration tool from the hello-world extension.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The name of the person to greet"
                },
                "formal": {
                    "type": "boolean",
                    "description": "Whether to use a formal greeting"
                }
            }
        }),
        vec!["name".into()],
        |call| {
            Box::pin(async move {
                #[derive(serde::Deserialize)]
                struct Input {
                    name: String,
                    #[serde(default)]
                    formal: bool,
                }

                let input: Input = match serde_json::from_str(&call.input) {
                    Ok(input) => input,
                    Err(e) => return Ok(ToolResponse::error(format!("invalid input: {e}"))),
                };

                let greeting = if input.formal {
                    format!(
                        "Good day, {}. It is a pleasure to make your acquaintance.",
                        input.name
                    )
                } else {
                    format!("Hey {}!", input.name)
                };

                Ok(ToolResponse::text(greeting))
            })
        },
    )));

    Box::new(ext)
}

quill_extensions::export_extension!(create);
