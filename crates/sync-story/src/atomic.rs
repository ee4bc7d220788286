//! Atomic file replacement.
//!
//! Both the local repository and the settings file are replaced with
//! write-temp / verify / rename discipline, so a process kill mid-write
//! can never leave a half-written file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace `path` with `bytes`, atomically.
pub fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, bytes)?;

    // Verify the temp file before it replaces the real one.
    let written = fs::read(&tmp)?;
    if written != bytes {
        let _ = fs::remove_file(&tmp);
        return Err(io::Error::other("verification of written file failed"));
    }

    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replace_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/data.json");

        replace_file(&path, b"content").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"content");
    }

    #[test]
    fn test_replace_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        replace_file(&path, b"old").unwrap();
        replace_file(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        replace_file(&path, b"content").unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
