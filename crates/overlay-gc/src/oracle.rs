//! Liveness oracle: which layer directories the runtime still references.
//!
//! The runtime is the authority on liveness. A [`LivenessOracle`] returns a
//! [`LivenessSet`] snapshot of every layer identifier referenced by any
//! container (running or stopped) or any image (used or not). If the runtime
//! cannot be queried the oracle fails with
//! [`ReclaimError::OracleUnavailable`]; it never returns a partial set.
//!
//! # Identifier Extraction
//!
//! Container and image metadata reference layer directories by absolute
//! path, for example in the overlay driver data:
//!
//! ```text
//! "LowerDir": "/var/lib/docker/overlay2/3f2a...-init/diff:/var/lib/docker/overlay2/9c1e.../diff",
//! "UpperDir": "/var/lib/docker/overlay2/3f2a.../diff",
//! ```
//!
//! Every string value in the metadata is scanned for `<driver-dir>/<id>`
//! segments, so whole lower-layer chains are captured, not only the top layer.
//!
//! Every container and image stored by the overlay driver references at least
//! one layer. An inspected object yielding no identifier means the runtime
//! keeps its layers somewhere other than a directory named `<driver-dir>`
//! (a renamed bind mount, another storage driver), so the query fails rather
//! than reporting those layers as unreferenced.

use std::collections::HashSet;
use std::collections::hash_set;

use serde_json::Value;

use crate::error::{ReclaimError, Result};
use crate::runtime::{ObjectKind, RuntimeCli, RuntimeError};

/// Snapshot of layer identifiers referenced by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessSet(HashSet<String>);

impl LivenessSet {
    /// An empty set: nothing is referenced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is referenced.
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Record `id` as referenced.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    /// Number of referenced identifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no identifiers are referenced.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the referenced identifiers in no particular order.
    pub fn iter(&self) -> hash_set::Iter<'_, String> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for LivenessSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for LivenessSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// Source of the set of live layer identifiers.
pub trait LivenessOracle {
    /// Query the runtime for every referenced layer identifier.
    ///
    /// Read-only. Fails with [`ReclaimError::OracleUnavailable`] when the
    /// answer cannot be determined completely.
    fn query_live_identifiers(&self) -> Result<LivenessSet>;
}

/// Oracle backed by the runtime CLI.
#[derive(Debug, Clone)]
pub struct RuntimeOracle {
    cli: RuntimeCli,
    driver_dir: String,
}

impl RuntimeOracle {
    /// Create an oracle recognising layer paths under a directory named
    /// `driver_dir` (e.g. `overlay2`).
    pub fn new(cli: RuntimeCli, driver_dir: impl Into<String>) -> Self {
        Self {
            cli,
            driver_dir: driver_dir.into(),
        }
    }

    fn unrecognised(&self, kind: ObjectKind, object: &Value) -> RuntimeError {
        let id = object.get("Id").and_then(Value::as_str).unwrap_or("<unknown>");
        RuntimeError::Parse {
            command: format!("inspect --type {}", kind.as_str()),
            details: format!(
                "{} {} references no layer under a `{}` directory; \
                 the storage root does not match the runtime's layer directory",
                kind.as_str(),
                id,
                self.driver_dir
            ),
        }
    }
}

impl LivenessOracle for RuntimeOracle {
    fn query_live_identifiers(&self) -> Result<LivenessSet> {
        let containers = self
            .cli
            .container_ids()
            .map_err(ReclaimError::OracleUnavailable)?;
        let images = self
            .cli
            .image_ids()
            .map_err(ReclaimError::OracleUnavailable)?;

        let mut live = LivenessSet::new();
        for (kind, ids) in [
            (ObjectKind::Container, &containers),
            (ObjectKind::Image, &images),
        ] {
            let metadata = self
                .cli
                .inspect(kind, ids)
                .map_err(ReclaimError::OracleUnavailable)?;
            for object in &metadata {
                let mut found = LivenessSet::new();
                collect_identifiers(object, &self.driver_dir, &mut found);
                if found.is_empty() {
                    return Err(ReclaimError::OracleUnavailable(self.unrecognised(kind, object)));
                }
                live.extend(found.0);
            }
        }

        tracing::info!(
            containers = containers.len(),
            images = images.len(),
            layers = live.len(),
            "collected live layer references"
        );
        Ok(live)
    }
}

/// Add every layer identifier referenced anywhere in `value` to `live`.
pub fn collect_identifiers(value: &Value, driver_dir: &str, live: &mut LivenessSet) {
    match value {
        Value::String(s) => live.extend(identifiers_in(s, driver_dir)),
        Value::Array(items) => {
            for item in items {
                collect_identifiers(item, driver_dir, live);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_identifiers(item, driver_dir, live);
            }
        }
        _ => {}
    }
}

/// Layer identifiers named by `<driver_dir>/<id>` path segments in `s`.
///
/// The driver directory must be a whole path component, and the identifier
/// ends at the next `/`, `:` or end of string.
pub fn identifiers_in<'a>(s: &'a str, driver_dir: &str) -> Vec<&'a str> {
    let marker = format!("{}/", driver_dir);
    let mut ids = Vec::new();
    let mut offset = 0;

    while let Some(pos) = s[offset..].find(&marker) {
        let start = offset + pos;
        let id_start = start + marker.len();
        offset = id_start;

        let at_boundary = start == 0 || matches!(s.as_bytes()[start - 1], b'/' | b':');
        if !at_boundary {
            continue;
        }

        let rest = &s[id_start..];
        let id_len = rest.find(['/', ':']).unwrap_or(rest.len());
        let id = &rest[..id_len];
        if !id.is_empty() {
            ids.push(id);
        }
    }

    ids
}
