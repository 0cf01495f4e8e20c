//! Atomic file write using the write-rename pattern.
//!
//! Data goes to `{path}.tmp`, is flushed with `sync_all()`, then renamed over
//! the final path. A crash mid-write leaves the previous snapshot intact.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically writes `data` to `path`, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = tmp_path_for(path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.snap");

        atomic_write(&path, b"hello world").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"hello world");
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn test_atomic_write_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.snap");

        atomic_write(&path, b"version 1").unwrap();
        atomic_write(&path, b"version 2").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"version 2");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/trust.snap");

        atomic_write(&path, b"nested data").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"nested data");
    }

    #[test]
    fn test_leftover_tmp_from_crashed_write_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.snap");
        let tmp = tmp_path_for(&path);

        fs::write(&path, b"original").unwrap();
        fs::write(&tmp, b"partial garbage").unwrap();

        atomic_write(&path, b"new snapshot").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new snapshot");
        assert!(!tmp.exists());
    }

    #[test]
    fn test_tmp_name_appends_suffix() {
        let tmp = tmp_path_for(Path::new("/var/lib/flood/trust.snap"));
        assert_eq!(tmp, PathBuf::from("/var/lib/flood/trust.snap.tmp"));
    }
}
