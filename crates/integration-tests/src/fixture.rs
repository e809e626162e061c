//! Test fixtures for isolated overlay storage roots.

use std::cell::Cell;
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use overlay_gc::{
    LayerFs, LivenessOracle, LivenessSet, OverlayRoot, ReclaimConfig, ReclaimError, RuntimeError,
};

/// An isolated overlay storage root with its own audit log location.
///
/// Layout:
/// - `overlay2/` - storage root, one subdirectory per layer
/// - `overlay2/l/` - short link directory
/// - `deleted.log` - audit log path (not created until a pass deletes)
///
/// Everything is removed when the fixture is dropped.
pub struct TestOverlay {
    /// Root temporary directory.
    _temp_dir: TempDir,
    /// Path to the storage root.
    root_path: PathBuf,
    /// Path the audit log is written to.
    audit_log: PathBuf,
}

impl TestOverlay {
    /// Create an empty storage root.
    pub fn new() -> color_eyre::Result<Self> {
        let temp_dir = TempDir::new()?;
        let root_path = temp_dir.path().join("overlay2");
        std::fs::create_dir_all(root_path.join("l"))?;
        let audit_log = temp_dir.path().join("deleted.log");

        Ok(Self {
            _temp_dir: temp_dir,
            root_path,
            audit_log,
        })
    }

    /// Create a layer directory whose `diff/` holds `size` bytes.
    ///
    /// The data file is sparse, so large sizes cost no disk space.
    pub fn add_layer(&self, id: &str, size: u64) -> color_eyre::Result<PathBuf> {
        let layer = self.root_path.join(id);
        std::fs::create_dir_all(layer.join("diff"))?;
        std::fs::create_dir_all(layer.join("work"))?;
        let data = File::create(layer.join("diff/data"))?;
        data.set_len(size)?;
        Ok(layer)
    }

    /// Open the storage root.
    pub fn open(&self) -> color_eyre::Result<OverlayRoot> {
        Ok(OverlayRoot::open(&self.root_path)?)
    }

    /// Configuration pointing at this fixture.
    pub fn config(&self) -> ReclaimConfig {
        ReclaimConfig {
            storage_root: self.root_path.clone(),
            audit_log: self.audit_log.clone(),
            ..Default::default()
        }
    }

    /// Get the storage root path.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Get the audit log path.
    pub fn audit_log(&self) -> &Path {
        &self.audit_log
    }

    /// Names of the directories currently under the storage root, sorted.
    pub fn entries(&self) -> color_eyre::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root_path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for TestOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestOverlay")
            .field("root_path", &self.root_path)
            .finish()
    }
}

/// Wraps a real [`OverlayRoot`] and injects failures for chosen layers.
pub struct FaultyFs {
    inner: OverlayRoot,
    /// Layers whose measurement fails with permission denied.
    pub unreadable: HashSet<String>,
    /// Layers whose removal fails as if busy.
    pub busy: HashSet<String>,
    removals: Cell<usize>,
}

impl FaultyFs {
    /// Wrap `inner` with no faults configured.
    pub fn new(inner: OverlayRoot) -> Self {
        Self {
            inner,
            unreadable: HashSet::new(),
            busy: HashSet::new(),
            removals: Cell::new(0),
        }
    }

    /// Number of removal attempts, successful or not.
    pub fn removals(&self) -> usize {
        self.removals.get()
    }
}

impl LayerFs for FaultyFs {
    fn list(&self) -> io::Result<Vec<String>> {
        self.inner.list()
    }

    fn measure(&self, id: &str) -> io::Result<u64> {
        if self.unreadable.contains(id) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: permission denied", id),
            ));
        }
        self.inner.measure(id)
    }

    fn remove(&self, id: &str) -> io::Result<()> {
        self.removals.set(self.removals.get() + 1);
        if self.busy.contains(id) {
            return Err(io::Error::other("device or resource busy"));
        }
        self.inner.remove(id)
    }
}

/// Oracle returning a fixed snapshot.
pub struct StaticOracle(pub LivenessSet);

impl StaticOracle {
    /// Snapshot referencing exactly `ids`.
    pub fn of(ids: &[&str]) -> Self {
        Self(ids.iter().copied().collect())
    }
}

impl LivenessOracle for StaticOracle {
    fn query_live_identifiers(&self) -> overlay_gc::Result<LivenessSet> {
        Ok(self.0.clone())
    }
}

/// Oracle whose runtime is unreachable.
pub struct UnavailableOracle;

impl LivenessOracle for UnavailableOracle {
    fn query_live_identifiers(&self) -> overlay_gc::Result<LivenessSet> {
        Err(ReclaimError::OracleUnavailable(RuntimeError::Status {
            command: "docker ps --all --quiet --no-trunc".to_string(),
            code: Some(1),
            stderr: "Cannot connect to the Docker daemon".to_string(),
        }))
    }
}
