//! Error types shared across the daemon.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all daemon failure modes.
///
/// Every variant that reaches a connection handler is rendered through
/// [`Display`] into the `error` field of the response, so the prefix is
/// part of the wire contract callers may match on.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Local socket setup or accept failure.
    Ipc(String),
    /// Malformed, truncated, or oversized request payload.
    Codec(String),
    /// No pipeline registered for the requested `(package, function)`.
    UnknownSkill(String),
    /// Request arguments do not satisfy the pipeline's contract.
    InvalidArgs(String),
    /// A pipeline stage failed internally.
    Stage(String),
    /// Upstream code-generation provider failure.
    Provider(String),
    /// A deadline expired before the work completed.
    Timeout(String),
    /// Admission control rejected the connection.
    Busy(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::UnknownSkill(msg) => write!(f, "unknown skill: {msg}"),
            Self::InvalidArgs(msg) => write!(f, "invalid args: {msg}"),
            Self::Stage(msg) => write!(f, "stage: {msg}"),
            Self::Provider(msg) => write!(f, "provider: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}
