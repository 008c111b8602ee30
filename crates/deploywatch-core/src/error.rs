//! Core error types for deploywatch-core

use thiserror::Error;

/// Errors that abort tracking
///
/// Entity failures reported by the event stream are data, not errors; only
/// I/O problems and broken plumbing end up here.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Event file could not be opened
    #[error("cannot open event file {path}: {message}")]
    EventFile {
        /// Path that was opened
        path: String,
        /// Underlying I/O error
        message: String,
    },

    /// Reading the event stream failed after it was opened
    #[error("event stream read failed: {0}")]
    StreamRead(String),

    /// Audit log could not be created or written
    #[error("audit log {path}: {message}")]
    AuditLog {
        /// Destination path
        path: String,
        /// Underlying I/O error
        message: String,
    },

    /// Audit log was already closed
    #[error("audit log already closed")]
    AuditLogClosed,

    /// Deployment manifest could not be read or parsed
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}
