//! Error types for csi-watch
//!
//! Errors carry structured fields so log lines point at the volume, test case
//! or operation that failed rather than just a message.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for csi-watch operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid input or runner setup
    #[error("validation error for {subject}: {message}")]
    Validation {
        /// What was being validated (entity name, flag, ...)
        subject: String,
        /// Description of what's invalid
        message: String,
    },

    /// Result store failure
    #[error("store error [{operation}]: {message}")]
    Store {
        /// Store operation that failed (save_events, save_outcome)
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// An operation did not finish within its deadline
    #[error("timeout after {after:?} waiting for {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// How long we waited
        after: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "runner", "observer")
        context: String,
    },
}

impl Error {
    /// Create a validation error without a specific subject
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            subject: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error about a named subject
    pub fn validation_for(subject: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            subject: subject.into(),
            message: msg.into(),
        }
    }

    /// Create a store error for the given operation
    pub fn store(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// 4xx Kubernetes responses and validation errors need a fix, not a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Store { .. } => true,
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::Store { operation, .. } => Some(operation),
            _ => None,
        }
    }
}
