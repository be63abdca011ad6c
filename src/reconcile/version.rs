//! Dotted numeric config versions.

use crate::error::{Result, SyncError};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A config version such as `3.0` or `3.10.1`.
///
/// Components compare numerically and missing trailing components count as
/// zero, so `3` == `3.0` and `3.2` < `3.10`.
#[derive(Debug, Clone)]
pub struct ConfigVersion {
    parts: Vec<u64>,
}

impl ConfigVersion {
    /// Whether `self` is strictly newer than `other`.
    pub fn is_newer_than(&self, other: &ConfigVersion) -> bool {
        self > other
    }

    fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for ConfigVersion {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SyncError::Validation("empty config version".to_string()));
        }

        let parts = trimmed
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                SyncError::Validation(format!("invalid config version '{}': {}", trimmed, e))
            })?;

        Ok(Self { parts })
    }
}

impl Ord for ConfigVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ConfigVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ConfigVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ConfigVersion {}

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&rendered.join("."))
    }
}

/// Whether a snapshot written by `remote` code may be applied by `local` code.
///
/// A remote version that does not parse is treated as newer, hence not
/// applicable.
pub fn is_applicable(remote: &str, local: &ConfigVersion) -> bool {
    match remote.parse::<ConfigVersion>() {
        Ok(remote) => !remote.is_newer_than(local),
        Err(e) => {
            tracing::warn!(version = remote, error = %e, "unparsable remote config version");
            false
        }
    }
}
