//! Error types for hierlock
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (missing identifier, bad arguments, invalid config)
//! - 3: Lock contention (conflict, deadlock victim, wait timeout, cancelled)
//! - 4: Operation failed (substrate fault, io)

use std::time::Duration;

use thiserror::Error;

use crate::hierarchy::{HierarchyLevel, LockMode};
use crate::substrate::SubstrateError;

/// Exit codes for the hierlock CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const CONTENTION: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for hierlock operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Contention (exit code 3)
    #[error("Lock conflict on {level} bucket {bucket} ({mode})")]
    Conflict {
        level: HierarchyLevel,
        bucket: u32,
        mode: LockMode,
    },

    #[error("Deadlock detected while locking {level} bucket {bucket} ({mode}); restart the acquisition")]
    Deadlock {
        level: HierarchyLevel,
        bucket: u32,
        mode: LockMode,
    },

    #[error("Lock wait timed out after {waited:?} on {level} bucket {bucket} ({mode})")]
    Timeout {
        level: HierarchyLevel,
        bucket: u32,
        mode: LockMode,
        waited: Duration,
    },

    #[error("Lock acquisition cancelled while waiting on {level} bucket {bucket}")]
    Cancelled { level: HierarchyLevel, bucket: u32 },

    // Operation failures (exit code 4)
    #[error("Lock row for {level} bucket {bucket} is not provisioned")]
    MissingRow { level: HierarchyLevel, bucket: u32 },

    #[error("Lock substrate failure: {0}")]
    SubstrateFault(String),

    #[error("Lock handle already released")]
    HandleReleased,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Classify a substrate failure against the target that was being requested
    pub fn from_substrate(
        err: SubstrateError,
        level: HierarchyLevel,
        bucket: u32,
        mode: LockMode,
    ) -> Self {
        match err {
            SubstrateError::Conflict => Error::Conflict { level, bucket, mode },
            SubstrateError::Deadlock => Error::Deadlock { level, bucket, mode },
            SubstrateError::Timeout { waited } => Error::Timeout {
                level,
                bucket,
                mode,
                waited,
            },
            SubstrateError::Cancelled => Error::Cancelled { level, bucket },
            SubstrateError::MissingRow => Error::MissingRow { level, bucket },
            SubstrateError::Fault(message) => Error::SubstrateFault(message),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::Validation(_) | Error::InvalidConfig(_) | Error::InvalidArgument(_) => {
                exit_codes::USER_ERROR
            }

            // Contention
            Error::Conflict { .. }
            | Error::Deadlock { .. }
            | Error::Timeout { .. }
            | Error::Cancelled { .. } => exit_codes::CONTENTION,

            // Operation failures
            Error::MissingRow { .. }
            | Error::SubstrateFault(_)
            | Error::HandleReleased
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Whether the caller should discard everything and restart the whole acquisition
    pub fn is_restartable(&self) -> bool {
        matches!(self, Error::Deadlock { .. } | Error::Timeout { .. })
    }

    /// Structured details for JSON output
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Conflict { level, bucket, mode } | Error::Deadlock { level, bucket, mode } => {
                Some(serde_json::json!({
                    "level": level.as_str(),
                    "bucket": bucket,
                    "mode": mode.as_str(),
                }))
            }
            Error::Timeout {
                level,
                bucket,
                mode,
                waited,
            } => Some(serde_json::json!({
                "level": level.as_str(),
                "bucket": bucket,
                "mode": mode.as_str(),
                "waited_ms": waited.as_millis() as u64,
            })),
            Error::Cancelled { level, bucket } | Error::MissingRow { level, bucket } => {
                Some(serde_json::json!({
                    "level": level.as_str(),
                    "bucket": bucket,
                }))
            }
            _ => None,
        }
    }
}

/// Result type alias for hierlock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
