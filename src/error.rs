//! Error types for bili-audio-dl
//!
//! This module provides the error taxonomy for the library:
//! - Validation errors raised before a task is scheduled
//! - Part-level errors (transient transfer, missing artifact) that count toward a task's
//!   error budget
//! - Integrity mismatches that turn a cached artifact into a resume point
//! - The terminal `Fatal` error recorded on a task once its budget is exhausted

use crate::types::{TaskId, TaskState};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bili-audio-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bili-audio-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// A task submission is missing a required parameter or has an invalid one
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The offending request field (e.g., "output_dir")
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// Task not found in the registry
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A registry mutation would break the task state machine
    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The task being mutated
        id: TaskId,
        /// Current state
        from: TaskState,
        /// Requested state
        to: TaskState,
    },

    /// Network transfer or transcode failed in a way that is worth retrying
    #[error("transfer failed: {0}")]
    TransientTransfer(String),

    /// Expected output file never appeared (or never became readable)
    #[error("artifact missing after {waited_secs}s: {path}")]
    ArtifactMissing {
        /// The file that was waited for
        path: PathBuf,
        /// How long the poll ran before giving up
        waited_secs: u64,
    },

    /// A cached artifact is smaller than the size recorded in the history ledger
    #[error("artifact {path} is {actual} bytes, history recorded {expected}")]
    IntegrityMismatch {
        /// The cached artifact
        path: PathBuf,
        /// Size recorded when the artifact was finished
        expected: u64,
        /// Size found on disk
        actual: u64,
    },

    /// Task error budget exhausted, the task is terminally failed
    #[error("task {id} failed after {errors} errors: {last_error}")]
    Fatal {
        /// The failed task
        id: TaskId,
        /// Errors accumulated by the task
        errors: u32,
        /// Message of the last error seen
        last_error: String,
    },

    /// Admission queue is full - task was not registered
    #[error("admission queue is full ({capacity} tasks waiting)")]
    QueueFull {
        /// Configured admission queue capacity
        capacity: usize,
    },

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decode/encode error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] error
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}
