//! The deletion audit log.
//!
//! After a pass that deleted at least one directory, the audit log is
//! replaced with one line per deleted layer:
//!
//! ```text
//! 0b7a3e...c41f (100MB)
//! 91dd2c...0e2a-init (12KB)
//! ```
//!
//! The log describes the most recent pass only. It is written to a temporary
//! file next to the target and renamed into place, so readers never observe a
//! partially written log.

use std::io;
use std::path::Path;

use cap_std::ambient_authority;
use cap_std::fs::Dir;

use crate::error::{ReclaimError, Result};
use crate::reclaim::DeletionRecord;

/// Replace the audit log at `path` with a line per record.
pub fn write_audit_log(path: &Path, records: &[&DeletionRecord]) -> Result<()> {
    let mut contents = String::new();
    for record in records {
        contents.push_str(&record.audit_line());
        contents.push('\n');
    }

    replace_file(path, contents.as_bytes()).map_err(|source| ReclaimError::AuditLog {
        path: path.to_path_buf(),
        source,
    })
}

/// Read back the identifiers recorded in an audit log.
pub fn read_audit_log(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .filter_map(|line| line.split_once(" (").map(|(id, _)| id.to_string()))
        .collect())
}

fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "audit log path has no file name")
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    let temp_name = format!(".{}.{}.tmp", name.to_string_lossy(), std::process::id());
    dir.write(&temp_name, contents)?;
    if let Err(e) = dir.rename(&temp_name, &dir, name) {
        let _ = dir.remove_file(&temp_name);
        return Err(e);
    }
    Ok(())
}
