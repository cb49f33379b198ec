//! Core types and services for the Quill agent runtime.
//!
//! This crate holds what the rest of the workspace builds on: the parsed
//! configuration, the shared error type, the pub/sub broker, the session,
//! message, and permission services, and the agent-facing tool surface.

pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod permission;
pub mod pubsub;
pub mod session;
pub mod tool;

pub use error::{QuillError, Result};
