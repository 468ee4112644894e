#![forbid(unsafe_code)]

//! `allpath-runner` — local skill daemon serving pipelines over a Unix socket.

pub mod config;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod pipeline;
pub mod skills;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
