//! Extension registry — indexes loaded extensions and walks hook pipelines.
//!
//! The registry keeps one append-only pipeline per hook kind. Triggers
//! snapshot the pipeline under a shared lock, release it, and invoke the
//! hooks lock-free, so concurrent event streams never serialize against
//! each other and a firing hook never blocks load or unload.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use quill_core::config::Config;
use quill_core::message::Message;
use quill_core::permission::{CreatePermissionRequest, PermissionDecision};
use quill_core::session::Session;

use crate::hooks::{
    AgentFinishInput, AgentHook, AgentStartInput, AgentStepInput, ConfigHook, HookSet,
    MessageHook, PermissionHook, SessionHook, ToolHook, ToolHookInput, ToolHookResult,
};
use crate::{Extension, ExtensionContext, ExtensionInfo};

/// Hook pipeline kinds, used for introspection and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Config,
    Session,
    Message,
    Permission,
    Tool,
    Agent,
}

#[derive(Default)]
struct RegistryInner {
    extensions: HashMap<String, Arc<dyn Extension>>,
    /// Load order; pipelines and tool collection follow it.
    order: Vec<String>,
    config_hooks: Vec<Arc<dyn ConfigHook>>,
    session_hooks: Vec<Arc<dyn SessionHook>>,
    message_hooks: Vec<Arc<dyn MessageHook>>,
    permission_hooks: Vec<Arc<dyn PermissionHook>>,
    tool_hooks: Vec<Arc<dyn ToolHook>>,
    agent_hooks: Vec<Arc<dyn AgentHook>>,
}

impl RegistryInner {
    fn register_hooks(&mut self, hooks: HookSet) {
        if let Some(hook) = hooks.config {
            self.config_hooks.push(hook);
        }
        if let Some(hook) = hooks.session {
            self.session_hooks.push(hook);
        }
        if let Some(hook) = hooks.message {
            self.message_hooks.push(hook);
        }
        if let Some(hook) = hooks.permission {
            self.permission_hooks.push(hook);
        }
        if let Some(hook) = hooks.tool {
            self.tool_hooks.push(hook);
        }
        if let Some(hook) = hooks.agent {
            self.agent_hooks.push(hook);
        }
    }
}

/// Registry of loaded extensions and their hook pipelines.
pub struct ExtensionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Load an extension: reject duplicates by name, run `init`, then
    /// store it and append its hooks to the pipelines.
    ///
    /// `init` runs outside the registry lock; only the index/pipeline
    /// mutation is exclusive.
    pub async fn load(
        &self,
        extension: Arc<dyn Extension>,
        ctx: &ExtensionContext,
    ) -> anyhow::Result<()> {
        let info = extension.info();

        if self.inner.read().await.extensions.contains_key(&info.name) {
            anyhow::bail!("extension {} is already loaded", info.name);
        }

        extension
            .init(ctx)
            .await
            .with_context(|| format!("failed to initialize extension {}", info.name))?;

        let hooks = extension.hooks();

        let mut inner = self.inner.write().await;
        if inner.extensions.contains_key(&info.name) {
            anyhow::bail!("extension {} is already loaded", info.name);
        }
        inner.order.push(info.name.clone());
        inner.extensions.insert(info.name.clone(), extension);
        inner.register_hooks(hooks);

        tracing::info!(name = %info.name, version = %info.version, "Extension loaded");
        Ok(())
    }

    /// Unload an extension by name: run `shutdown` and remove it from the
    /// name index.
    ///
    /// Hook pipelines are not rebuilt — hooks, once registered, fire for
    /// the lifetime of the process. A trigger in flight may still invoke a
    /// hook whose extension has been shut down; extensions must leave
    /// their hooks inert after `shutdown`.
    pub async fn unload(&self, name: &str) -> anyhow::Result<()> {
        let extension = self
            .inner
            .read()
            .await
            .extensions
            .get(name)
            .cloned()
            .with_context(|| format!("extension {name} is not loaded"))?;

        extension
            .shutdown()
            .await
            .with_context(|| format!("failed to shut down extension {name}"))?;

        let mut inner = self.inner.write().await;
        inner.extensions.remove(name);
        inner.order.retain(|n| n != name);
        Ok(())
    }

    /// Retrieve a loaded extension by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.inner.read().await.extensions.get(name).cloned()
    }

    /// Metadata of all loaded extensions, in load order.
    pub async fn list(&self) -> Vec<ExtensionInfo> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| inner.extensions.get(name))
            .map(|ext| ext.info())
            .collect()
    }

    /// Shut down every loaded extension, accumulating failures.
    pub async fn shutdown_all(&self) -> anyhow::Result<()> {
        let extensions: Vec<(String, Arc<dyn Extension>)> = {
            let inner = self.inner.read().await;
            inner
                .order
                .iter()
                .filter_map(|name| {
                    inner
                        .extensions
                        .get(name)
                        .map(|ext| (name.clone(), ext.clone()))
                })
                .collect()
        };

        let mut failures = Vec::new();
        for (name, extension) in extensions {
            if let Err(e) = extension.shutdown().await {
                tracing::error!(name = %name, error = %e, "Extension shutdown failed");
                failures.push(name);
            }
        }

        if !failures.is_empty() {
            anyhow::bail!(
                "failed to shut down {} extension(s): {}",
                failures.len(),
                failures.join(", ")
            );
        }
        Ok(())
    }

    /// Number of hooks registered for a pipeline kind.
    pub async fn hook_count(&self, kind: HookKind) -> usize {
        let inner = self.inner.read().await;
        match kind {
            HookKind::Config => inner.config_hooks.len(),
            HookKind::Session => inner.session_hooks.len(),
            HookKind::Message => inner.message_hooks.len(),
            HookKind::Permission => inner.permission_hooks.len(),
            HookKind::Tool => inner.tool_hooks.len(),
            HookKind::Agent => inner.agent_hooks.len(),
        }
    }

    pub(crate) async fn extensions_in_order(&self) -> Vec<Arc<dyn Extension>> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| inner.extensions.get(name))
            .cloned()
            .collect()
    }

    // --- Trigger operations ---
    //
    // Each trigger copies the relevant pipeline under the shared lock,
    // releases it, then walks the snapshot in registration order. An
    // extension loaded mid-trigger is not observed by that trigger.

    /// Trigger all config hooks. Any error aborts startup.
    pub async fn trigger_config_load(
        &self,
        cancel: &CancellationToken,
        config: &mut Config,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.config_hooks.clone();
        for hook in hooks {
            guarded("config", hook.on_config_load(cancel, config))
                .await
                .context("config hook failed")?;
        }
        Ok(())
    }

    pub async fn trigger_session_created(
        &self,
        cancel: &CancellationToken,
        session: &Session,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.session_hooks.clone();
        for hook in hooks {
            guarded("session", hook.on_session_created(cancel, session))
                .await
                .context("session created hook failed")?;
        }
        Ok(())
    }

    pub async fn trigger_session_updated(
        &self,
        cancel: &CancellationToken,
        session: &Session,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.session_hooks.clone();
        for hook in hooks {
            guarded("session", hook.on_session_updated(cancel, session))
                .await
                .context("session updated hook failed")?;
        }
        Ok(())
    }

    pub async fn trigger_session_deleted(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.session_hooks.clone();
        for hook in hooks {
            guarded("session", hook.on_session_deleted(cancel, session_id))
                .await
                .context("session deleted hook failed")?;
        }
        Ok(())
    }

    pub async fn trigger_message_created(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.message_hooks.clone();
        for hook in hooks {
            guarded("message", hook.on_message_created(cancel, message))
                .await
                .context("message created hook failed")?;
        }
        Ok(())
    }

    pub async fn trigger_message_updated(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.message_hooks.clone();
        for hook in hooks {
            guarded("message", hook.on_message_updated(cancel, message))
                .await
                .context("message updated hook failed")?;
        }
        Ok(())
    }

    /// Trigger permission hooks in order and return the first non-`None`
    /// decision; hooks after it are not called. Any error fails the
    /// request.
    pub async fn trigger_permission_request(
        &self,
        cancel: &CancellationToken,
        request: &CreatePermissionRequest,
    ) -> anyhow::Result<Option<PermissionDecision>> {
        let hooks = self.inner.read().await.permission_hooks.clone();
        for hook in hooks {
            let decision = guarded("permission", hook.on_permission_request(cancel, request))
                .await
                .context("permission hook failed")?;
            if decision.is_some() {
                return Ok(decision);
            }
        }
        Ok(None)
    }

    /// Trigger before-hooks for a tool execution. Each hook may replace
    /// the arguments; replacements are visible to subsequent hooks. The
    /// final arguments are returned for the tool itself.
    pub async fn trigger_tool_execute_before(
        &self,
        cancel: &CancellationToken,
        mut input: ToolHookInput,
    ) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
        let hooks = self.inner.read().await.tool_hooks.clone();
        for hook in hooks {
            let modified = guarded("tool", hook.on_tool_execute_before(cancel, &input))
                .await
                .context("tool execute before hook failed")?;
            if let Some(arguments) = modified {
                input.arguments = arguments;
            }
        }
        Ok(input.arguments)
    }

    /// Trigger after-hooks for a tool execution. Each hook may replace the
    /// result; replacements are visible to subsequent hooks. The final
    /// result is returned.
    pub async fn trigger_tool_execute_after(
        &self,
        cancel: &CancellationToken,
        input: &ToolHookInput,
        mut result: ToolHookResult,
    ) -> anyhow::Result<ToolHookResult> {
        let hooks = self.inner.read().await.tool_hooks.clone();
        for hook in hooks {
            let modified = guarded("tool", hook.on_tool_execute_after(cancel, input, &result))
                .await
                .context("tool execute after hook failed")?;
            if let Some(replacement) = modified {
                result = replacement;
            }
        }
        Ok(result)
    }

    pub async fn trigger_agent_start(
        &self,
        cancel: &CancellationToken,
        input: &AgentStartInput,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.agent_hooks.clone();
        for hook in hooks {
            guarded("agent", hook.on_agent_start(cancel, input))
                .await
                .context("agent start hook failed")?;
        }
        Ok(())
    }

    pub async fn trigger_agent_step(
        &self,
        cancel: &CancellationToken,
        input: &AgentStepInput,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.agent_hooks.clone();
        for hook in hooks {
            guarded("agent", hook.on_agent_step(cancel, input))
                .await
                .context("agent step hook failed")?;
        }
        Ok(())
    }

    pub async fn trigger_agent_finish(
        &self,
        cancel: &CancellationToken,
        input: &AgentFinishInput,
    ) -> anyhow::Result<()> {
        let hooks = self.inner.read().await.agent_hooks.clone();
        for hook in hooks {
            guarded("agent", hook.on_agent_finish(cancel, input))
                .await
                .context("agent finish hook failed")?;
        }
        Ok(())
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a hook future, converting a panic into an error. Extension
/// misbehavior must never unwind into the host.
async fn guarded<T>(
    kind: &'static str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "{kind} hook panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
