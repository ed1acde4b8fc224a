//! Database directory management.
//!
//! This module handles the file system layout for replidb:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ SNAPSHOT          # JSON snapshot of every collection
//! ```
//!
//! The LOCK file ensures only one process can open the database at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const SNAPSHOT_FILE: &str = "SNAPSHOT";
/// Temporary file for atomic snapshot writes.
const SNAPSHOT_TEMP: &str = "SNAPSHOT.tmp";

/// Manages the database directory and holds its exclusive lock.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
    is_new: bool,
}

impl DatabaseDir {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        let is_new = !path.join(SNAPSHOT_FILE).exists();

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            is_new,
        })
    }

    /// Returns the path to the database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if no snapshot existed when the directory was opened.
    pub fn is_new_database(&self) -> bool {
        self.is_new
    }

    /// Reads the snapshot bytes, or `None` for a new database.
    pub fn load_snapshot(&self) -> CoreResult<Option<Vec<u8>>> {
        let snapshot_path = self.path.join(SNAPSHOT_FILE);
        if !snapshot_path.exists() {
            return Ok(None);
        }

        let mut data = Vec::new();
        File::open(&snapshot_path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Writes the snapshot atomically (write, fsync, rename).
    pub fn save_snapshot(&self, data: &[u8]) -> CoreResult<()> {
        let temp_path = self.path.join(SNAPSHOT_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path.join(SNAPSHOT_FILE))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db");

        let dir = DatabaseDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(dir.is_new_database());
        assert_eq!(dir.path(), path);
    }

    #[test]
    fn missing_directory_without_create() {
        let temp = TempDir::new().unwrap();
        let result = DatabaseDir::open(&temp.path().join("nope"), false);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = TempDir::new().unwrap();
        let _first = DatabaseDir::open(temp.path(), true).unwrap();
        let second = DatabaseDir::open(temp.path(), true);
        assert!(matches!(second, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn snapshot_roundtrip() {
        let temp = TempDir::new().unwrap();
        let dir = DatabaseDir::open(temp.path(), true).unwrap();
        assert!(dir.load_snapshot().unwrap().is_none());

        dir.save_snapshot(b"{\"collections\":[]}").unwrap();
        assert_eq!(dir.load_snapshot().unwrap().unwrap(), b"{\"collections\":[]}");
        assert!(!temp.path().join(SNAPSHOT_TEMP).exists());
    }
}
