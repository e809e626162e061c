#![forbid(unsafe_code)]
//! Reclaim orphaned overlay layer directories and report container disk usage.
//!
//! Container runtimes using a layered storage driver keep one directory per
//! layer under a storage root such as `/var/lib/docker/overlay2`. Crashes,
//! interrupted pulls and manual tampering leave directories behind that no
//! container or image references any more. This library finds and removes
//! them, and reports where the runtime's disk space goes.
//!
//! # Overview
//!
//! - [`oracle`]: asks the runtime which layer identifiers are live
//! - [`reclaim`]: diffs the storage root against that snapshot and deletes
//!   the rest, recording every candidate's outcome
//! - [`audit`]: writes the per-pass deletion log
//! - [`usage`]: read-only size report for containers, images, build cache
//!   and volumes
//!
//! # Safety Contract
//!
//! A directory is deleted only if its identifier is absent from a liveness
//! snapshot taken before the storage root was enumerated. If the runtime
//! cannot be queried, the pass stops with
//! [`ReclaimError::OracleUnavailable`] before touching the filesystem.
//!
//! # Example
//!
//! ```no_run
//! use overlay_gc::{OverlayRoot, ReclaimConfig, RuntimeCli, RuntimeOracle, run_pass};
//!
//! let config = ReclaimConfig::load(None)?;
//! let oracle = RuntimeOracle::new(
//!     RuntimeCli::new(config.runtime.clone()),
//!     config.driver_dir_name()?,
//! );
//! let root = OverlayRoot::open(&config.storage_root)?;
//! let report = run_pass(&oracle, &root, &config, false)?;
//! println!("deleted {} directories", report.deleted().count());
//! # Ok::<(), overlay_gc::ReclaimError>(())
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod layer_fs;
pub mod oracle;
pub mod reclaim;
pub mod runtime;
pub mod units;
pub mod usage;

pub use config::ReclaimConfig;
pub use error::{ReclaimError, Result};
pub use layer_fs::{LayerFs, OverlayRoot};
pub use oracle::{LivenessOracle, LivenessSet, RuntimeOracle};
pub use reclaim::{DeletionRecord, Outcome, ReclaimReport, Reclaimer, SkipReason, run_pass};
pub use runtime::{RuntimeCli, RuntimeError};
pub use usage::{UsageReport, UsageSource, VolumeSize, VolumeUsage};
