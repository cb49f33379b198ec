use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuillError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Extension error: {0}")]
    Extension(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Message error: {0}")]
    Message(String),

    #[error("Permission error: {0}")]
    Permission(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Skill error: {0}")]
    Skill(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, QuillError>;
