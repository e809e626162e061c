//! Configuration for reclaim passes and usage reports.
//!
//! A [`ReclaimConfig`] names the overlay storage root to scan, the audit log
//! to write, and the command used to reach the container runtime. Values are
//! layered, lowest precedence first:
//!
//! 1. Built-in defaults (Docker's overlay2 layout)
//! 2. A TOML file, either given explicitly or `/etc/overlay-gc.toml`
//! 3. Environment variables (`OVERLAY_GC_ROOT`, `OVERLAY_GC_AUDIT_LOG`,
//!    `OVERLAY_GC_RUNTIME`)
//! 4. Command-line flags, applied by the binary
//!
//! A configuration file looks like:
//! ```toml
//! storage-root = "/mnt/docker-data/overlay2"
//! audit-log = "/var/log/overlay-gc/deleted.log"
//! runtime = ["sudo", "docker"]
//! protected = ["l"]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ReclaimError, Result};

/// Default overlay storage root.
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/docker/overlay2";

/// Default location of the deletion audit log.
pub const DEFAULT_AUDIT_LOG: &str = "/tmp/deleted_overlay2_layers.log";

/// System-wide configuration file, read when present.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/overlay-gc.toml";

/// Environment variable overriding the storage root.
pub const ENV_ROOT: &str = "OVERLAY_GC_ROOT";
/// Environment variable overriding the audit log path.
pub const ENV_AUDIT_LOG: &str = "OVERLAY_GC_AUDIT_LOG";
/// Environment variable overriding the runtime command (whitespace separated).
pub const ENV_RUNTIME: &str = "OVERLAY_GC_RUNTIME";

/// Settings shared by the reclaimer and the usage reporter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReclaimConfig {
    /// Directory whose immediate subdirectories are layer directories.
    pub storage_root: PathBuf,

    /// Where the list of deleted layers is written after a pass.
    pub audit_log: PathBuf,

    /// Program and leading arguments used to invoke the runtime CLI.
    pub runtime: Vec<String>,

    /// Top-level names under the storage root that are never candidates.
    pub protected: Vec<String>,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            audit_log: PathBuf::from(DEFAULT_AUDIT_LOG),
            runtime: vec!["docker".to_string()],
            protected: vec!["l".to_string()],
        }
    }
}

impl ReclaimConfig {
    /// Parse configuration from TOML content. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from `path`, or from the system file if it exists,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => match std::fs::read_to_string(SYSTEM_CONFIG_PATH) {
                Ok(content) => Self::from_toml(&content)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                Err(e) => return Err(ReclaimError::Io(e)),
            },
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    ///
    /// Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v: &String| !v.trim().is_empty());

        if let Some(root) = get(ENV_ROOT) {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(log) = get(ENV_AUDIT_LOG) {
            self.audit_log = PathBuf::from(log);
        }
        if let Some(runtime) = get(ENV_RUNTIME) {
            self.runtime = split_command(&runtime);
        }
    }

    /// The final component of the storage root, e.g. `overlay2`.
    ///
    /// Runtime metadata refers to layer directories by paths containing this
    /// name, so it is what identifiers are recognised by.
    pub fn driver_dir_name(&self) -> Result<String> {
        self.storage_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ReclaimError::InvalidConfig(format!(
                    "storage root {} has no final path component",
                    self.storage_root.display()
                ))
            })
    }

    /// Check that the configuration can be used for a pass.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.first().is_none_or(|p| p.is_empty()) {
            return Err(ReclaimError::InvalidConfig(
                "runtime command is empty".to_string(),
            ));
        }
        self.driver_dir_name()?;
        Ok(())
    }
}

/// Split a command line on whitespace. No quoting is supported.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ReclaimConfig::default();
        assert_eq!(config.storage_root, PathBuf::from(DEFAULT_STORAGE_ROOT));
        assert_eq!(config.audit_log, PathBuf::from(DEFAULT_AUDIT_LOG));
        assert_eq!(config.runtime, vec!["docker"]);
        assert_eq!(config.protected, vec!["l"]);
        assert_eq!(config.driver_dir_name().unwrap(), "overlay2");
        config.validate().unwrap();
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ReclaimConfig::from_toml(
            r#"
            storage-root = "/mnt/docker-data/overlay2"
            runtime = ["sudo", "docker"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.storage_root,
            PathBuf::from("/mnt/docker-data/overlay2")
        );
        assert_eq!(config.runtime, vec!["sudo", "docker"]);
        assert_eq!(config.audit_log, PathBuf::from(DEFAULT_AUDIT_LOG));
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = ReclaimConfig::from_toml("storage_root = \"/x\"").unwrap_err();
        assert!(matches!(err, ReclaimError::ConfigParse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ROOT, "/srv/overlay2"),
            (ENV_AUDIT_LOG, "/var/log/gc.log"),
            (ENV_RUNTIME, "podman --remote"),
        ]
        .into_iter()
        .collect();

        let mut config = ReclaimConfig::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage_root, PathBuf::from("/srv/overlay2"));
        assert_eq!(config.audit_log, PathBuf::from("/var/log/gc.log"));
        assert_eq!(config.runtime, vec!["podman", "--remote"]);
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = ReclaimConfig::default();
        config.apply_env_from(|_| Some("  ".to_string()));
        assert_eq!(config, ReclaimConfig::default());
    }

    #[test]
    fn test_validate_rejects_empty_runtime() {
        let config = ReclaimConfig {
            runtime: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ReclaimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bare_root() {
        let config = ReclaimConfig {
            storage_root: PathBuf::from("/"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
