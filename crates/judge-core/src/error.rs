//! Infrastructure-facing error taxonomy.
//!
//! [`JudgeError`] covers failures that cross the worker loop boundary from
//! the adapters it depends on: queue store, relational store, container
//! daemon, and malformed configuration. It is deliberately separate from
//! [`crate::types::ExecutionError`] and [`crate::types::Verdict`], which
//! carry judging-domain outcomes (compilation failed, test case timed out,
//! wrong answer) rather than infrastructure faults.

use thiserror::Error;

/// Structured error variants for the judge worker's infrastructure layer.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The configured container daemon could not be reached at startup.
    #[error("container daemon unreachable: {0}")]
    DaemonUnreachable(String),

    /// A queue store (Redis) operation failed.
    #[error("queue store error: {0}")]
    Queue(#[from] redis::RedisError),

    /// A relational store (PostgreSQL) operation failed.
    #[error("relational store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A required environment variable was absent or unparsable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A job's hash payload could not be deserialized as JSON.
    #[error("malformed job payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}
