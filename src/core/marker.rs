//! Durable "last restored checksum" marker.
//!
//! The marker records the checksum of the last snapshot this instance restored
//! or backed up itself. It survives process restarts (it lives on the host's
//! disk) but not host replacement. It must only be written right after a
//! successful restore or self-backup.

use crate::checksum::Checksum;
use crate::core::persist::write_atomic;
use crate::error::Result;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Storage for the last restored checksum.
pub trait MarkerStore: Send + Sync {
    /// Read the marker, `None` when it was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read.
    fn load(&self) -> Result<Option<Checksum>>;

    /// Durably replace the marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    fn save(&self, checksum: &Checksum) -> Result<()>;
}

/// Marker kept in a single text file on the host.
pub struct FileMarkerStore {
    path: PathBuf,
}

impl FileMarkerStore {
    /// Use the file at `path`; it is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkerStore for FileMarkerStore {
    fn load(&self) -> Result<Option<Checksum>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Checksum::new(trimmed)))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, checksum: &Checksum) -> Result<()> {
        write_atomic(&self.path, checksum.as_str().as_bytes())?;
        tracing::debug!(
            path = %self.path.display(),
            checksum = %checksum,
            "last restored checksum saved"
        );
        Ok(())
    }
}

/// In-process marker, for tests and hosts without durable storage.
#[derive(Default)]
pub struct MemoryMarkerStore {
    value: Mutex<Option<Checksum>>,
    writes: Mutex<usize>,
}

impl MemoryMarkerStore {
    /// Create an empty marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a marker that already holds `checksum`.
    pub fn with_value(checksum: impl Into<Checksum>) -> Self {
        Self {
            value: Mutex::new(Some(checksum.into())),
            writes: Mutex::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn load(&self) -> Result<Option<Checksum>> {
        Ok(self.value.lock().clone())
    }

    fn save(&self, checksum: &Checksum) -> Result<()> {
        *self.value.lock() = Some(checksum.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}
