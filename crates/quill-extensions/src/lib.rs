//! Extension runtime for Quill.
//!
//! Extensions are loaded during application startup and can register hooks
//! to observe and customize behavior across the host lifecycle, and
//! contribute tools the agent can invoke.
//!
//! The pieces:
//! - the [`Extension`] contract and [`hooks`] surface extensions implement,
//! - the [`loader`] that resolves configured paths to loadable artifacts,
//! - the [`registry`] that indexes extensions and walks hook pipelines,
//! - the [`bridge`] that adapts extension tools to the agent's interface.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use quill_core::config::Config;
use quill_core::message::MessageService;
use quill_core::permission::PermissionService;
use quill_core::session::SessionService;

pub mod bridge;
pub mod hooks;
pub mod loader;
pub mod registry;
pub mod trace;

pub use bridge::ExtensionTool;
pub use hooks::HookSet;
pub use loader::{ExtensionLoader, LoadError};
pub use registry::ExtensionRegistry;

/// Metadata describing a loaded extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// Unique identifier for the extension.
    pub name: String,
    /// Semantic version of the extension.
    pub version: String,
    /// Human-readable description of what the extension does.
    pub description: String,
    /// Extension author or organization.
    pub author: String,
}

/// Core service handles exposed to extensions.
#[derive(Clone)]
pub struct Services {
    pub sessions: Arc<dyn SessionService>,
    pub messages: Arc<dyn MessageService>,
    pub permissions: Arc<dyn PermissionService>,
}

/// Context handed to each extension at initialization.
///
/// Extensions must not retain it past [`Extension::shutdown`].
#[derive(Clone)]
pub struct ExtensionContext {
    /// The application configuration as parsed at startup.
    pub config: Arc<Config>,
    /// Handles to core application services.
    pub services: Services,
    /// The current working directory.
    pub working_dir: PathBuf,
}

/// The contract every extension implements.
///
/// Exactly one instance exists per loaded artifact. Extensions are
/// identified by `info().name`; loading two extensions with the same name
/// is an error.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Metadata about the extension.
    fn info(&self) -> ExtensionInfo;

    /// Called when the extension is loaded, before any hooks are registered.
    async fn init(&self, ctx: &ExtensionContext) -> anyhow::Result<()>;

    /// The hook implementations provided by this extension.
    ///
    /// Leaving a [`HookSet`] slot empty means the extension doesn't
    /// implement that hook group.
    fn hooks(&self) -> HookSet;

    /// Called when the application is shutting down.
    async fn shutdown(&self) -> anyhow::Result<()>;

    /// Tools contributed by this extension. Empty by default.
    fn tools(&self) -> Vec<Arc<dyn ExtensionTool>> {
        Vec::new()
    }
}

/// Host API version baked into the entry declaration.
pub static API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The entry declaration a loadable artifact exports under the symbol
/// `Extension`.
///
/// `api_version` is compared against the host's [`API_VERSION`] before the
/// constructor runs; a mismatch is a contract error.
pub struct ExtensionDecl {
    pub api_version: &'static str,
    pub create: fn() -> Box<dyn Extension>,
}

/// Export an extension constructor from a `cdylib` artifact.
///
/// ```ignore
/// fn create() -> Box<dyn quill_extensions::Extension> {
///     Box::new(MyExtension::new())
/// }
/// quill_extensions::export_extension!(create);
/// ```
#[macro_export]
macro_rules! export_extension {
    ($create:path) => {
        #[doc(hidden)]
        #[allow(non_upper_case_globals)]
        #[no_mangle]
        pub static Extension: $crate::ExtensionDecl = $crate::ExtensionDecl {
            api_version: $crate::API_VERSION,
            create: $create,
        };
    };
}
