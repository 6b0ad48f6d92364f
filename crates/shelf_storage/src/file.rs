//! File-based storage backend for persistent storage.
//!
//! Layout of a backend root:
//!
//! ```text
//! <root>/
//! ├─ LOCK                      # Advisory lock for single-process access
//! ├─ 6e6f7465732d2d6462.jnl    # Journal of "notes--db" (hex-encoded name)
//! └─ 6e6f7465732d2d6462.tmp    # Transient file used by `replace`
//! ```

use crate::backend::{validate_name, StorageBackend};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_EXT: &str = "jnl";
const TEMP_EXT: &str = "tmp";

/// A file-based database directory.
///
/// Every database gets one journal file under the root directory. File names
/// are the hex encoding of the database name, so any name is representable
/// on any file system. Data survives process restarts.
///
/// # Durability
///
/// - `append` writes through to the OS
/// - `sync` calls `File::sync_data()` on the journal
/// - `replace` writes a temporary file, syncs it, renames it over the
///   journal and syncs the directory
///
/// # Thread Safety
///
/// This backend is thread-safe. Mutations are serialized by an internal
/// lock; an exclusive `fs2` lock on `<root>/LOCK` keeps other processes out.
///
/// # Example
///
/// ```no_run
/// use shelf_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("data")).unwrap();
/// backend.append("notes--db", b"persistent data").unwrap();
/// backend.sync("notes--db").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created or is not a directory
    /// - Another process holds the lock (returns [`StorageError::Locked`])
    /// - I/O errors occur
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        if !root.is_dir() {
            return Err(StorageError::Corrupted(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn journal_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{JOURNAL_EXT}", encode_name(name)))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{TEMP_EXT}", encode_name(name)))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(JOURNAL_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let name = decode_name(stem).ok_or_else(|| {
                StorageError::Corrupted(format!("unrecognized journal file: {}", path.display()))
            })?;
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_name(name)?;
        let mut file = match File::open(self.journal_path(name)) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    fn append(&self, name: &str, data: &[u8]) -> StorageResult<u64> {
        validate_name(name)?;
        let _guard = self.write_lock.lock();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path(name))?;
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(offset)
    }

    fn replace(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        validate_name(name)?;
        let _guard = self.write_lock.lock();

        let temp_path = self.temp_path(name);
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.journal_path(name))?;
        self.sync_directory()
    }

    fn remove(&self, name: &str) -> StorageResult<bool> {
        validate_name(name)?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(self.journal_path(name)) {
            Ok(()) => {
                self.sync_directory()?;
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn sync(&self, name: &str) -> StorageResult<()> {
        validate_name(name)?;
        match OpenOptions::new().append(true).open(self.journal_path(name)) {
            Ok(file) => {
                file.sync_data()?;
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn encode_name(name: &str) -> String {
    name.bytes().fold(String::with_capacity(name.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn decode_name(stem: &str) -> Option<String> {
    if stem.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..stem.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(stem.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_open_creates_root_and_lock() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("shelf");

        let backend = FileBackend::open(&root).unwrap();
        assert!(root.join(LOCK_FILE).exists());
        assert_eq!(backend.path(), root);
        assert!(backend.names().unwrap().is_empty());
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileBackend::open(dir.path()).unwrap();

        let second = FileBackend::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked)));
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        assert_eq!(backend.append("db", b"hello").unwrap(), 0);
        assert_eq!(backend.append("db", b" world").unwrap(), 5);
        assert_eq!(backend.read("db").unwrap().unwrap(), b"hello world");
        assert!(backend.read("other").unwrap().is_none());
    }

    #[test]
    fn file_names_roundtrip_through_encoding() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.append("notes--db", b"x").unwrap();
        backend.append("a/b c:ü", b"y").unwrap();

        let names = backend.names().unwrap();
        assert_eq!(names, vec!["a/b c:ü".to_string(), "notes--db".to_string()]);
    }

    #[test]
    fn file_replace_is_visible_and_removes_temp() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.append("db", b"old content").unwrap();
        backend.replace("db", b"new").unwrap();

        assert_eq!(backend.read("db").unwrap().unwrap(), b"new");
        assert!(!backend.temp_path("db").exists());
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.append("db", b"data").unwrap();
        assert!(backend.remove("db").unwrap());
        assert!(!backend.remove("db").unwrap());
        assert!(backend.names().unwrap().is_empty());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.append("db", b"persistent data").unwrap();
            backend.sync("db").unwrap();
        }

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            assert_eq!(backend.read("db").unwrap().unwrap(), b"persistent data");
            assert_eq!(backend.names().unwrap(), vec!["db".to_string()]);
        }
    }

    #[test]
    fn file_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        fs::write(dir.path().join("README.txt"), b"hi").unwrap();

        assert!(backend.names().unwrap().is_empty());
    }

    #[test]
    fn file_sync_missing_journal_is_ok() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.sync("missing").is_ok());
    }

    #[test]
    fn name_encoding_roundtrip() {
        for name in ["a", "notes--db", "ü/ß", "with space"] {
            assert_eq!(decode_name(&encode_name(name)).as_deref(), Some(name));
        }
        assert!(decode_name("abc").is_none());
        assert!(decode_name("zz").is_none());
    }
}
