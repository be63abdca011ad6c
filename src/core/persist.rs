//! Durable writes for host-local state files.

use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Replace `path` with `contents` so readers see either the old or the new file.
///
/// The data is written to a sibling temp file, flushed to disk, then renamed over
/// the target. Missing parent directories are created.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents_and_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/state.txt");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp_dir.path().join("nested/dir/state.txt.tmp").exists());
    }
}
