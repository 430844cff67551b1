//! Durable string key-value storage for the session mirror.
//!
//! The session store writes its token pair and user profile here after every
//! mutation and reads them back at startup. Values are plain strings; the
//! user profile is stored as JSON text.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;

/// One pending change: `Some` writes the value, `None` removes the key.
pub type Change<'a> = (&'a str, Option<&'a str>);

/// String-valued key-value storage.
pub trait KeyValueStore {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    /// Apply several changes as one unit: either all of them land or the
    /// store is left as it was.
    ///
    /// The default applies the changes in order and, on failure, restores
    /// the previous values of the keys already written. Stores that can
    /// commit a batch in one write should override it.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    fn apply(&mut self, changes: &[Change<'_>]) -> Result<(), StorageError> {
        let mut previous = Vec::with_capacity(changes.len());
        for (key, _) in changes {
            previous.push((*key, self.get(key)?));
        }

        for (applied, (key, value)) in changes.iter().enumerate() {
            let result = match value {
                Some(value) => self.set(key, value),
                None => self.remove(key),
            };
            if let Err(e) = result {
                for (key, old) in previous.iter().take(applied).rev() {
                    let undo = match old {
                        Some(old) => self.set(key, old),
                        None => self.remove(key),
                    };
                    if let Err(undo) = undo {
                        warn!(key, error = %undo, "Could not restore stored value");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// JSON-file storage.
///
/// The whole map is held in memory and rewritten on every change. Each write
/// goes to a randomly named temp file in the same directory, which is synced
/// and then renamed over the target, so readers only ever see a complete
/// file. On Unix the file is `0600` since it holds bearer tokens.
///
/// The in-memory map only moves forward once the file is on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| StorageError::Corrupt {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        debug!(path = %path.display(), keys = values.len(), "Opened session file");
        Ok(Self { path, values })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let body = serde_json::to_vec_pretty(values).map_err(StorageError::Encode)?;

        let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        file.write_all(&body).map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.apply(&[(key, Some(value))])
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.apply(&[(key, None)])
    }

    fn apply(&mut self, changes: &[Change<'_>]) -> Result<(), StorageError> {
        let mut next = self.values.clone();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    next.insert((*key).to_owned(), (*value).to_owned());
                }
                None => {
                    next.remove(*key);
                }
            }
        }
        if next == self.values {
            return Ok(());
        }

        self.write(&next)?;
        self.values = next;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("accessToken", "abc").unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("abc"));

        store.remove("accessToken").unwrap();
        store.remove("accessToken").unwrap();
        assert_eq!(store.get("accessToken").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("accessToken").unwrap(), None);
        store.set("accessToken", "abc").unwrap();
        store.set("user", "{\"id\":1}").unwrap();
        drop(store);

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("abc"));
        assert_eq!(store.get("user").unwrap().as_deref(), Some("{\"id\":1}"));

        store.remove("accessToken").unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("accessToken").unwrap(), None);
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_file_store_treats_empty_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("user").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut store = FileStore::open(&path).unwrap();
        store.set("refreshToken", "xyz").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_applies_batch_in_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut store = FileStore::open(&path).unwrap();
        store.set("refreshToken", "old").unwrap();

        store
            .apply(&[("accessToken", Some("abc")), ("refreshToken", None)])
            .unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("accessToken").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("refreshToken").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_failed_write_leaves_map_untouched() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        let path = locked.join("session.json");
        let mut store = FileStore::open(&path).unwrap();
        store.set("accessToken", "a").unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
        // Permission bits do not bind a privileged user; nothing to check then.
        if store.set("accessToken", "b").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("a"));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
        store.set("user", "{}").unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("accessToken").unwrap().as_deref(), Some("a"));
    }

    /// Store that refuses writes to one key.
    struct RefusingStore {
        inner: MemoryStore,
        refused: &'static str,
    }

    impl KeyValueStore for RefusingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == self.refused {
                return Err(StorageError::Io {
                    path: "session.json".to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_default_apply_restores_earlier_keys_on_failure() {
        let mut store = RefusingStore {
            inner: MemoryStore::new(),
            refused: "user",
        };
        store.set("accessToken", "token-a").unwrap();

        let err = store
            .apply(&[
                ("accessToken", Some("token-b")),
                ("refreshToken", Some("refresh-b")),
                ("user", Some("{}")),
            ])
            .unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("token-a"));
        assert_eq!(store.get("refreshToken").unwrap(), None);
    }
}
