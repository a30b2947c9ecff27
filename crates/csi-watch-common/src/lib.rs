//! Common building blocks for csi-watch: errors, retry, polling and telemetry

#![deny(missing_docs)]

pub mod error;
pub mod polling;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace used when none is given on the command line
pub const DEFAULT_NAMESPACE: &str = "default";
