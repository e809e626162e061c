//! Typed access to the container runtime's command-line interface.
//!
//! [`RuntimeCli`] invokes the configured runtime command (by default
//! `docker`) synchronously and parses its output into typed values. Every
//! call either returns fully parsed data or a [`RuntimeError`]; output that
//! does not have the expected shape is an error rather than a silent zero.
//!
//! # Commands Used
//!
//! | Query | Invocation |
//! |-------|------------|
//! | container IDs | `ps --all --quiet --no-trunc` |
//! | image IDs | `images --quiet --no-trunc` |
//! | metadata | `inspect --type <container\|image\|volume> <ids..>` |
//! | container sizes | `ps --all --size --format {{.Names}}\t{{.Size}}` |
//! | build cache | `system df --format {{json .}}` |
//! | volume names | `volume ls --quiet` |

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::units::parse_human_size;

/// Errors from invoking the runtime or interpreting its output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The runtime command could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The runtime exited unsuccessfully.
    #[error("`{command}` exited with status {code:?}: {stderr}")]
    Status {
        /// The full command line.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The runtime wrote output that is not valid UTF-8.
    #[error("`{command}` produced non-UTF-8 output")]
    Utf8 {
        /// The full command line.
        command: String,
    },

    /// JSON output could not be decoded.
    #[error("invalid JSON from `{command}`: {source}")]
    Json {
        /// The full command line.
        command: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Text output did not match the expected format.
    #[error("unexpected output from `{command}`: {details}")]
    Parse {
        /// The full command line.
        command: String,
        /// What was wrong with it.
        details: String,
    },

    /// No runtime command is configured.
    #[error("runtime command is empty")]
    EmptyCommand,
}

/// Which kind of object `inspect` should resolve IDs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A container, running or stopped.
    Container,
    /// An image.
    Image,
    /// A named volume.
    Volume,
}

impl ObjectKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Container => "container",
            ObjectKind::Image => "image",
            ObjectKind::Volume => "volume",
        }
    }
}

/// An image and its reported size.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageInfo {
    /// Full image ID (`sha256:...`).
    #[serde(rename = "Id")]
    pub id: String,
    /// Image size in bytes.
    #[serde(rename = "Size")]
    pub size: u64,
}

/// A runtime-managed volume.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeInfo {
    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Host path where the volume data lives.
    #[serde(rename = "Mountpoint")]
    pub mountpoint: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ContainerImageRef {
    #[serde(rename = "Image")]
    image: String,
}

#[derive(Debug, Deserialize)]
struct SystemDfRow {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Size")]
    size: String,
}

/// Handle for running runtime CLI queries.
#[derive(Debug, Clone)]
pub struct RuntimeCli {
    command: Vec<String>,
}

impl RuntimeCli {
    /// Create a client for the given program and leading arguments,
    /// e.g. `["docker"]` or `["sudo", "docker"]`.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Run the runtime with `args` appended and return its standard output.
    pub fn run(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let (program, leading) = self.command.split_first().ok_or(RuntimeError::EmptyCommand)?;
        let command_line = self.describe(args);
        tracing::debug!(command = %command_line, "querying runtime");

        let output = Command::new(program)
            .args(leading)
            .args(args)
            .output()
            .map_err(|source| RuntimeError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::Status {
                command: command_line,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| RuntimeError::Utf8 {
            command: command_line,
        })
    }

    fn describe(&self, args: &[&str]) -> String {
        self.command
            .iter()
            .map(String::as_str)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// IDs of all containers, including stopped ones.
    pub fn container_ids(&self) -> Result<Vec<String>, RuntimeError> {
        let out = self.run(&["ps", "--all", "--quiet", "--no-trunc"])?;
        Ok(unique_lines(&out))
    }

    /// IDs of all images. An image with several tags is listed once.
    pub fn image_ids(&self) -> Result<Vec<String>, RuntimeError> {
        let out = self.run(&["images", "--quiet", "--no-trunc"])?;
        Ok(unique_lines(&out))
    }

    /// Names of all volumes.
    pub fn volume_names(&self) -> Result<Vec<String>, RuntimeError> {
        let out = self.run(&["volume", "ls", "--quiet"])?;
        Ok(unique_lines(&out))
    }

    /// Full metadata for each of `ids`.
    ///
    /// No command is run for an empty list.
    pub fn inspect(&self, kind: ObjectKind, ids: &[String]) -> Result<Vec<Value>, RuntimeError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["inspect", "--type", kind.as_str()];
        args.extend(ids.iter().map(String::as_str));

        let out = self.run(&args)?;
        serde_json::from_str(&out).map_err(|source| RuntimeError::Json {
            command: self.describe(&args[..3]),
            source,
        })
    }

    /// Decode `inspect` output into a typed record per object.
    fn inspect_as<T>(&self, kind: ObjectKind, ids: &[String]) -> Result<Vec<T>, RuntimeError>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.inspect(kind, ids)?
            .into_iter()
            .map(|v| {
                serde_json::from_value(v).map_err(|source| RuntimeError::Json {
                    command: format!("{} inspect --type {}", self.describe(&[]), kind.as_str()),
                    source,
                })
            })
            .collect()
    }

    /// Virtual size of every container, keyed by container name.
    ///
    /// Containers whose size is reported as zero are left out.
    pub fn container_sizes(&self) -> Result<Vec<(String, u64)>, RuntimeError> {
        let args = ["ps", "--all", "--size", "--format", "{{.Names}}\t{{.Size}}"];
        let out = self.run(&args)?;
        let mut rows = Vec::new();

        for line in out.lines().filter(|l| !l.trim().is_empty()) {
            let Some((name, size)) = line.split_once('\t') else {
                return Err(RuntimeError::Parse {
                    command: self.describe(&args),
                    details: format!("expected `<name>\\t<size>`, got {:?}", line),
                });
            };
            let bytes = parse_virtual_size(size).ok_or_else(|| RuntimeError::Parse {
                command: self.describe(&args),
                details: format!("no virtual size in {:?}", size),
            })?;
            if bytes > 0 {
                rows.push((name.trim().to_string(), bytes));
            }
        }

        Ok(rows)
    }

    /// All images with their sizes.
    pub fn images(&self) -> Result<Vec<ImageInfo>, RuntimeError> {
        let ids = self.image_ids()?;
        self.inspect_as(ObjectKind::Image, &ids)
    }

    /// IDs of images used by at least one container, running or stopped.
    pub fn used_image_ids(&self) -> Result<HashSet<String>, RuntimeError> {
        let ids = self.container_ids()?;
        let refs: Vec<ContainerImageRef> = self.inspect_as(ObjectKind::Container, &ids)?;
        Ok(refs.into_iter().map(|r| r.image).collect())
    }

    /// Total size of the build cache. Zero when the runtime reports none.
    pub fn build_cache_size(&self) -> Result<u64, RuntimeError> {
        let args = ["system", "df", "--format", "{{json .}}"];
        let out = self.run(&args)?;

        for line in out.lines().filter(|l| !l.trim().is_empty()) {
            let row: SystemDfRow =
                serde_json::from_str(line).map_err(|source| RuntimeError::Json {
                    command: self.describe(&args),
                    source,
                })?;
            if row.kind == "Build Cache" {
                return parse_human_size(&row.size).ok_or_else(|| RuntimeError::Parse {
                    command: self.describe(&args),
                    details: format!("unrecognised build cache size {:?}", row.size),
                });
            }
        }

        Ok(0)
    }

    /// All volumes with their mountpoints.
    pub fn volumes(&self) -> Result<Vec<VolumeInfo>, RuntimeError> {
        let names = self.volume_names()?;
        self.inspect_as(ObjectKind::Volume, &names)
    }
}

/// Non-empty trimmed lines, first occurrence wins.
fn unique_lines(output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(*l))
        .map(str::to_string)
        .collect()
}

/// Extract the virtual size from a `ps --size` column such as
/// `"2B (virtual 1.2GB)"`.
fn parse_virtual_size(column: &str) -> Option<u64> {
    let start = column.find("(virtual")? + "(virtual".len();
    let rest = &column[start..];
    let end = rest.find(')')?;
    parse_human_size(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_lines() {
        let out = "sha256:aaa\n\nsha256:bbb\nsha256:aaa\n  \n";
        assert_eq!(unique_lines(out), vec!["sha256:aaa", "sha256:bbb"]);
    }

    #[test]
    fn test_parse_virtual_size() {
        assert_eq!(parse_virtual_size("0B (virtual 5MB)"), Some(5 * 1024 * 1024));
        assert_eq!(parse_virtual_size("12kB (virtual 1.5GB)"), Some(1536 * 1024 * 1024));
        assert_eq!(parse_virtual_size("0B (virtual 0B)"), Some(0));
        assert_eq!(parse_virtual_size("12kB"), None);
        assert_eq!(parse_virtual_size("(virtual lots)"), None);
    }

    #[test]
    fn test_describe() {
        let cli = RuntimeCli::new(vec!["sudo".into(), "docker".into()]);
        assert_eq!(cli.describe(&["ps", "-a"]), "sudo docker ps -a");
    }

    #[test]
    fn test_empty_command() {
        let cli = RuntimeCli::new(Vec::new());
        assert!(matches!(cli.run(&["ps"]), Err(RuntimeError::EmptyCommand)));
    }

    #[test]
    fn test_spawn_failure() {
        let cli = RuntimeCli::new(vec!["/nonexistent/overlay-gc-runtime".into()]);
        assert!(matches!(
            cli.container_ids(),
            Err(RuntimeError::Spawn { .. })
        ));
    }

    #[test]
    fn test_nonzero_exit_is_status_error() {
        let cli = RuntimeCli::new(vec!["sh".into(), "-c".into(), "echo boom >&2; exit 3".into()]);
        match cli.image_ids() {
            Err(RuntimeError::Status { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_inspect_empty_runs_nothing() {
        let cli = RuntimeCli::new(vec!["/nonexistent/overlay-gc-runtime".into()]);
        assert!(cli.inspect(ObjectKind::Image, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_inspect_malformed_json() {
        let cli = RuntimeCli::new(vec!["sh".into(), "-c".into(), "echo not-json".into()]);
        let err = cli
            .inspect(ObjectKind::Container, &["abc".to_string()])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Json { .. }));
    }

    #[test]
    fn test_image_info_deserialize() {
        let json = r#"{"Id": "sha256:abc", "Size": 1024, "RepoTags": ["alpine:latest"]}"#;
        let info: ImageInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id, "sha256:abc");
        assert_eq!(info.size, 1024);
    }
}
