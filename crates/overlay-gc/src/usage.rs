//! Disk usage report across containers, images, build cache and volumes.
//!
//! Each category is queried independently through a [`UsageSource`]. A
//! category whose query fails is logged and reported as zero (or empty); the
//! remaining categories are still collected. The report is read-only and
//! shares nothing with the reclaimer.

use std::io;

use serde::Serialize;

use crate::layer_fs::path_size;
use crate::runtime::{RuntimeCli, RuntimeError};

/// Size of one volume, or why it is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeSize {
    /// Measured size in bytes.
    Bytes(u64),
    /// The volume's data could not be read.
    PermissionDenied,
    /// Measuring failed for another reason.
    Failed(String),
}

impl VolumeSize {
    /// Bytes, counting unknown sizes as zero.
    pub fn bytes(&self) -> u64 {
        match self {
            VolumeSize::Bytes(n) => *n,
            _ => 0,
        }
    }

    /// Classify the result of measuring a volume directory.
    pub fn from_measurement(result: io::Result<u64>) -> Self {
        match result {
            Ok(n) => VolumeSize::Bytes(n),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => VolumeSize::PermissionDenied,
            Err(e) => VolumeSize::Failed(e.to_string()),
        }
    }
}

/// A volume and its on-disk size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeUsage {
    /// Volume name.
    pub name: String,
    /// Measured size.
    pub size: VolumeSize,
}

/// Read-only queries feeding the usage report.
pub trait UsageSource {
    /// Virtual size of each container, by name.
    fn container_sizes(&self) -> Result<Vec<(String, u64)>, RuntimeError>;

    /// Total size of images used by some container, and of the rest.
    fn image_sizes(&self) -> Result<(u64, u64), RuntimeError>;

    /// Size of the build cache.
    fn build_cache_size(&self) -> Result<u64, RuntimeError>;

    /// Size of each volume whose data directory exists.
    fn volume_sizes(&self) -> Result<Vec<VolumeUsage>, RuntimeError>;
}

impl UsageSource for RuntimeCli {
    fn container_sizes(&self) -> Result<Vec<(String, u64)>, RuntimeError> {
        RuntimeCli::container_sizes(self)
    }

    fn image_sizes(&self) -> Result<(u64, u64), RuntimeError> {
        let used_ids = self.used_image_ids()?;
        let mut used = 0u64;
        let mut unused = 0u64;
        for image in self.images()? {
            if used_ids.contains(&image.id) {
                used += image.size;
            } else {
                unused += image.size;
            }
        }
        Ok((used, unused))
    }

    fn build_cache_size(&self) -> Result<u64, RuntimeError> {
        RuntimeCli::build_cache_size(self)
    }

    fn volume_sizes(&self) -> Result<Vec<VolumeUsage>, RuntimeError> {
        let mut usage = Vec::new();
        for volume in self.volumes()? {
            if !volume.mountpoint.exists() {
                tracing::debug!(volume = %volume.name, "mountpoint missing, skipping");
                continue;
            }
            usage.push(VolumeUsage {
                size: VolumeSize::from_measurement(path_size(&volume.mountpoint)),
                name: volume.name,
            });
        }
        Ok(usage)
    }
}

/// Aggregated disk usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    /// Virtual size per container.
    pub containers: Vec<(String, u64)>,
    /// Images referenced by at least one container.
    pub images_used: u64,
    /// Images no container references.
    pub images_unused: u64,
    /// Build cache.
    pub build_cache: u64,
    /// Size per volume.
    pub volumes: Vec<VolumeUsage>,
}

impl UsageReport {
    /// Sum of container sizes.
    pub fn containers_total(&self) -> u64 {
        self.containers.iter().map(|(_, n)| n).sum()
    }

    /// Sum of known volume sizes.
    pub fn volumes_total(&self) -> u64 {
        self.volumes.iter().map(|v| v.size.bytes()).sum()
    }

    /// Total over every category.
    pub fn grand_total(&self) -> u64 {
        self.containers_total()
            + self.images_used
            + self.images_unused
            + self.build_cache
            + self.volumes_total()
    }
}

/// Collect every category from `source`.
///
/// Never fails: a category that cannot be queried contributes nothing.
pub fn collect<S: UsageSource + ?Sized>(source: &S) -> UsageReport {
    let containers = or_default("containers", source.container_sizes());
    let (images_used, images_unused) = or_default("images", source.image_sizes());
    let build_cache = or_default("build cache", source.build_cache_size());
    let volumes = or_default("volumes", source.volume_sizes());

    UsageReport {
        containers,
        images_used,
        images_unused,
        build_cache,
        volumes,
    }
}

fn or_default<T: Default>(category: &str, result: Result<T, RuntimeError>) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(category, error = %e, "usage query failed, reporting zero");
        T::default()
    })
}
