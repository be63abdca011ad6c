//! The startup drift decision.

use super::version::{ConfigVersion, is_applicable};
use crate::checksum::Checksum;
use crate::store::ConfigSnapshot;
use std::fmt;

/// What startup reconciliation does about the store's latest snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// No snapshot, or it matches local state
    NoOp,
    /// The store still holds what this host last restored, so the local
    /// difference is a legitimate local change; publish it
    SelfBackup,
    /// Another host published something new that this code can read; take it
    Restore,
    /// The snapshot needs newer code; leave local state alone
    VersionSkip,
}

impl Decision {
    /// Lower-case label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp => "no_op",
            Self::SelfBackup => "self_backup",
            Self::Restore => "restore",
            Self::VersionSkip => "version_skip",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide how to reconcile local state with the store's latest snapshot.
///
/// Rules, in order:
/// 1. no remote snapshot, or equal checksums: nothing to do;
/// 2. remote equals the last restored checksum: self-backup (this is what
///    keeps two hosts from restoring each other's changes in a loop);
/// 3. remote written by the same or older code: restore;
/// 4. otherwise: skip.
pub fn decide(
    current: &Checksum,
    last_restored: Option<&Checksum>,
    remote: Option<&ConfigSnapshot>,
    local_version: &ConfigVersion,
) -> Decision {
    let Some(remote) = remote else {
        return Decision::NoOp;
    };

    if &remote.checksum == current {
        Decision::NoOp
    } else if Some(&remote.checksum) == last_restored {
        Decision::SelfBackup
    } else if is_applicable(&remote.config_version, local_version) {
        Decision::Restore
    } else {
        Decision::VersionSkip
    }
}
