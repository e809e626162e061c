//! Error types for the overlay-gc library.
//!
//! Operations that can fail as a whole return a [`Result<T>`], an alias for
//! `Result<T, ReclaimError>`.
//!
//! # Error Categories
//!
//! - **Liveness**: [`OracleUnavailable`] is the only error that stops a reclaim
//!   pass. When the runtime cannot tell us which layers are referenced, nothing
//!   is deleted.
//! - **Storage**: [`RootNotFound`], [`AuditLog`]
//! - **Configuration**: [`InvalidConfig`], [`ConfigParse`]
//! - **System errors**: [`Io`]
//!
//! Failures that concern a single layer directory (permission denied while
//! measuring, a busy directory during removal) are not errors at this level.
//! They are recorded as an [`Outcome`](crate::reclaim::Outcome) on the
//! candidate and the pass continues.
//!
//! [`OracleUnavailable`]: ReclaimError::OracleUnavailable
//! [`RootNotFound`]: ReclaimError::RootNotFound
//! [`AuditLog`]: ReclaimError::AuditLog
//! [`InvalidConfig`]: ReclaimError::InvalidConfig
//! [`ConfigParse`]: ReclaimError::ConfigParse
//! [`Io`]: ReclaimError::Io
//!
//! # Error Handling Example
//!
//! ```no_run
//! use overlay_gc::{ReclaimConfig, ReclaimError, RuntimeCli, RuntimeOracle};
//! use overlay_gc::oracle::LivenessOracle;
//!
//! let config = ReclaimConfig::default();
//! let oracle = RuntimeOracle::new(RuntimeCli::new(config.runtime.clone()), "overlay2");
//! match oracle.query_live_identifiers() {
//!     Ok(live) => println!("{} live layers", live.len()),
//!     Err(ReclaimError::OracleUnavailable(e)) => eprintln!("refusing to reclaim: {e}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

use std::path::PathBuf;

use crate::runtime::RuntimeError;

/// Result type alias for operations that may return a ReclaimError.
pub type Result<T> = std::result::Result<T, ReclaimError>;

/// Error types for reclaim and report operations.
#[derive(Debug, thiserror::Error)]
pub enum ReclaimError {
    /// The container runtime could not be queried for referenced layers.
    #[error("liveness oracle unavailable: {0}")]
    OracleUnavailable(#[source] RuntimeError),

    /// Storage root directory was not found at the specified path.
    #[error("storage root not found at {0}")]
    RootNotFound(PathBuf),

    /// Configuration is present but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The audit log could not be written.
    #[error("failed to write audit log {path}: {source}")]
    AuditLog {
        /// Path of the audit log.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReclaimError {
    /// Whether this error means the liveness oracle could not be consulted.
    ///
    /// Callers use this to report a failure that is distinct from a pass
    /// that simply found nothing to delete.
    pub fn is_oracle_failure(&self) -> bool {
        matches!(self, ReclaimError::OracleUnavailable(_))
    }
}
