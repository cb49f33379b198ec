//! Extension loader — resolves configured paths to loadable artifacts.
//!
//! Artifacts are native dynamic libraries (`cdylib`) exporting a static
//! named `Extension` of type [`ExtensionDecl`](crate::ExtensionDecl),
//! normally produced with the
//! [`export_extension!`](crate::export_extension) macro.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use quill_core::config::Config;

use crate::registry::ExtensionRegistry;
use crate::{Extension, ExtensionContext, ExtensionDecl, API_VERSION};

/// The exported symbol every artifact must carry.
pub const ENTRY_SYMBOL: &str = "Extension";

/// Classified loader failures.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("extension path does not exist: {0}")]
    PathMissing(PathBuf),

    #[error("no .{suffix} artifact found in directory: {dir}")]
    NoArtifactInDirectory { dir: PathBuf, suffix: &'static str },

    #[error("extension artifact must be a .{expected} file, got: {path}")]
    UnsupportedArtifact { path: PathBuf, expected: &'static str },

    #[error("failed to open extension artifact: {0}")]
    LoadFailure(#[source] libloading::Error),

    #[error("artifact does not export an `{ENTRY_SYMBOL}` symbol: {0}")]
    MissingEntrySymbol(#[source] libloading::Error),

    #[error("`{ENTRY_SYMBOL}` symbol does not match the extension contract \
             (host api {host}, artifact api {artifact})")]
    ContractMismatch { host: String, artifact: String },

    /// Init failure or duplicate name, reported by the registry.
    #[error(transparent)]
    Rejected(#[from] anyhow::Error),
}

/// Loads extensions from configured paths into a registry.
///
/// Library handles are retained for the lifetime of the loader (in
/// practice, the process): hooks and tools handed out by an extension
/// reference code inside its library.
pub struct ExtensionLoader {
    registry: Arc<ExtensionRegistry>,
    libraries: Mutex<Vec<Library>>,
}

impl ExtensionLoader {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            registry,
            libraries: Mutex::new(Vec::new()),
        }
    }

    /// Load an extension from a file or directory path.
    ///
    /// A directory is searched for its first artifact (lexicographic order)
    /// with the platform's dynamic-library suffix.
    pub async fn load_from_path(
        &self,
        path: impl AsRef<Path>,
        ctx: &ExtensionContext,
    ) -> Result<(), LoadError> {
        let path = path.as_ref();
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        };

        let metadata =
            std::fs::metadata(&abs_path).map_err(|_| LoadError::PathMissing(abs_path.clone()))?;

        let artifact = if metadata.is_dir() {
            find_artifact_in_dir(&abs_path)?
        } else {
            abs_path
        };

        if artifact.extension().and_then(|e| e.to_str()) != Some(std::env::consts::DLL_EXTENSION) {
            return Err(LoadError::UnsupportedArtifact {
                path: artifact,
                expected: std::env::consts::DLL_EXTENSION,
            });
        }

        self.load_artifact(&artifact, ctx).await
    }

    /// Open the artifact, resolve the entry symbol, and hand the extension
    /// instance to the registry.
    async fn load_artifact(
        &self,
        path: &Path,
        ctx: &ExtensionContext,
    ) -> Result<(), LoadError> {
        // SAFETY: opening the library runs its initializers; extension
        // artifacts are user-configured code running in-process.
        let library = unsafe { Library::new(path) }.map_err(LoadError::LoadFailure)?;

        let extension: Arc<dyn Extension> = {
            // SAFETY: the symbol is read as an `ExtensionDecl`, which the
            // api-version check below validates. The referenced data cannot
            // outlive its library; the handle is retained below for the
            // loader's lifetime.
            let decl = unsafe { library.get::<*const ExtensionDecl>(ENTRY_SYMBOL.as_bytes()) }
                .map_err(LoadError::MissingEntrySymbol)?;
            let decl: &ExtensionDecl = unsafe { &**decl };

            if decl.api_version != API_VERSION {
                return Err(LoadError::ContractMismatch {
                    host: API_VERSION.to_string(),
                    artifact: decl.api_version.to_string(),
                });
            }

            Arc::from((decl.create)())
        };

        self.registry.load(extension, ctx).await?;
        self.libraries.lock().await.push(library);

        info!(path = %path.display(), "Extension artifact loaded");
        Ok(())
    }

    /// Load every extension listed in the configuration.
    ///
    /// Tolerant: a failing path logs a warning and the rest keep loading.
    /// Returns the number of extensions loaded.
    pub async fn load_from_config(&self, config: &Config, ctx: &ExtensionContext) -> usize {
        let mut loaded = 0;
        for path in config.plugin_paths() {
            match self.load_from_path(path, ctx).await {
                Ok(()) => loaded += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to load extension, skipping");
                }
            }
        }
        loaded
    }
}

/// Find the first artifact with the platform's dynamic-library suffix in a
/// directory, by lexicographic order of file names.
fn find_artifact_in_dir(dir: &Path) -> Result<PathBuf, LoadError> {
    let suffix = std::env::consts::DLL_EXTENSION;

    let entries = std::fs::read_dir(dir).map_err(|_| LoadError::PathMissing(dir.to_path_buf()))?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == suffix)
        })
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| LoadError::NoArtifactInDirectory {
            dir: dir.to_path_buf(),
            suffix,
        })
}
