//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Quill configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ordered list of extension artifact paths to load at startup.
    ///
    /// Each entry is a path to a dynamic library or to a directory
    /// containing one. Empty or absent means no extensions.
    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Working directory for the current run. Set by the host after
    /// loading, not read from the file.
    #[serde(skip)]
    pub working_dir: Option<PathBuf>,
}

/// Permission checkpoint behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Skip interactive prompts entirely and grant every request.
    #[serde(default)]
    pub skip_requests: bool,

    /// Tools that never require a prompt.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Substitute `${ENV_VAR}` references with environment values.
/// Missing variables become empty strings.
fn substitute_env_vars(input: &str) -> String {
    let re = env_var_regex();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

fn env_var_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("env var regex"))
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::QuillError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::QuillError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location: `~/.quill/config.json`
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// The working directory for this run, defaulting to the process cwd.
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Ordered extension artifact paths from the `plugins` key.
    pub fn plugin_paths(&self) -> &[String] {
        &self.plugins
    }
}

/// Base directory for Quill data: `~/.quill/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quill")
}
