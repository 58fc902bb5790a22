//! Durable client-side token storage.
//!
//! Two fixed keys hold the access and refresh tokens as opaque strings. The
//! store is process-wide; only the session store writes to it, and only
//! [`crate::session::SessionStore::restore_session`] reads it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::api::{AccessToken, RefreshToken, TokenPair};

/// Storage keys for persisted tokens.
pub mod keys {
    /// Key for the access token.
    pub const ACCESS_TOKEN: &str = "accessToken";

    /// Key for the refresh token.
    pub const REFRESH_TOKEN: &str = "refreshToken";
}

/// Errors from the storage primitive.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("token storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file is not a JSON object of strings.
    #[error("token storage at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tokens as found in storage at boot.
#[derive(Debug, Clone, Default)]
pub struct StoredTokens {
    /// Persisted access token, if any.
    pub access_token: Option<AccessToken>,
    /// Persisted refresh token, if any.
    pub refresh_token: Option<RefreshToken>,
}

/// Durable key-value storage for the two session tokens.
///
/// Each operation is atomic: a reader never observes one key written
/// without the other.
pub trait TokenStorage: Send + Sync {
    /// Read whatever tokens are persisted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn load(&self) -> Result<StoredTokens, StorageError>;

    /// Persist both tokens, replacing previous values.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails; previous values are kept.
    fn save(&self, tokens: &TokenPair) -> Result<(), StorageError>;

    /// Remove both tokens.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the removal fails.
    fn clear(&self) -> Result<(), StorageError>;
}

type Entries = BTreeMap<String, String>;

fn entries_for(tokens: &TokenPair) -> Entries {
    let mut entries = Entries::new();
    entries.insert(
        keys::ACCESS_TOKEN.to_string(),
        tokens.access_token.expose().to_string(),
    );
    if let Some(refresh) = &tokens.refresh_token {
        entries.insert(keys::REFRESH_TOKEN.to_string(), refresh.expose().to_string());
    }
    entries
}

fn tokens_from(entries: &Entries) -> StoredTokens {
    StoredTokens {
        access_token: entries
            .get(keys::ACCESS_TOKEN)
            .filter(|t| !t.is_empty())
            .cloned()
            .map(AccessToken::from),
        refresh_token: entries
            .get(keys::REFRESH_TOKEN)
            .filter(|t| !t.is_empty())
            .cloned()
            .map(RefreshToken::from),
    }
}

// =============================================================================
// File storage
// =============================================================================

/// Tokens persisted as a small JSON object on disk.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves either the old or the new tokens. On unix the file
/// is readable by its owner only (`0o600`) before any token is written.
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    /// Create storage backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<StoredTokens, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoredTokens::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        let entries: Entries =
            serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(tokens_from(&entries))
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let body = serde_json::to_string_pretty(&entries_for(tokens)).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
        restrict_to_owner(&tmp).map_err(|e| self.io_error(e))?;
        file.write_all(body.as_bytes()).map_err(|e| self.io_error(e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

fn restrict_to_owner(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

// =============================================================================
// Memory storage
// =============================================================================

/// Ephemeral storage for tests and one-shot sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    entries: Mutex<Entries>,
}

impl MemoryTokenStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage pre-seeded with raw key/value pairs.
    #[must_use]
    pub fn with_entries<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entries: Mutex::new(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Raw value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        // A poisoned map is still a valid map of strings.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<StoredTokens, StorageError> {
        Ok(tokens_from(&self.lock()))
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        *self.lock() = entries_for(tokens);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
        TokenPair {
            access_token: AccessToken::new(access),
            refresh_token: refresh.map(RefreshToken::new),
        }
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("tokens.json"));

        let tokens = storage.load().unwrap();
        assert!(tokens.access_token.is_none());
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_file_storage_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("nested/tokens.json"));

        storage.save(&pair("at-1", Some("rt-1"))).unwrap();
        let tokens = storage.load().unwrap();
        assert_eq!(tokens.access_token.unwrap().expose(), "at-1");
        assert_eq!(tokens.refresh_token.unwrap().expose(), "rt-1");

        let raw = fs::read_to_string(storage.path()).unwrap();
        assert!(raw.contains("\"accessToken\""));
        assert!(raw.contains("\"refreshToken\""));

        storage.clear().unwrap();
        assert!(!storage.path().exists());
        // Clearing twice is fine
        storage.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("tokens.json"));
        fs::write(storage.path().with_extension("tmp"), "{}").unwrap();
        fs::set_permissions(
            storage.path().with_extension("tmp"),
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        storage.save(&pair("at-1", Some("rt-1"))).unwrap();

        let mode = fs::metadata(storage.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_file_storage_save_replaces_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("tokens.json"));

        storage.save(&pair("at-1", Some("rt-1"))).unwrap();
        storage.save(&pair("at-2", None)).unwrap();

        let tokens = storage.load().unwrap();
        assert_eq!(tokens.access_token.unwrap().expose(), "at-2");
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_file_storage_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "not json").unwrap();

        let err = FileTokenStorage::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_memory_storage_ignores_empty_values() {
        let storage = MemoryTokenStorage::with_entries([(keys::ACCESS_TOKEN, "")]);
        assert!(storage.load().unwrap().access_token.is_none());
    }

    #[test]
    fn test_memory_storage_clear_removes_both_keys() {
        let storage = MemoryTokenStorage::new();
        storage.save(&pair("at", Some("rt"))).unwrap();
        assert!(storage.contains(keys::ACCESS_TOKEN));
        assert!(storage.contains(keys::REFRESH_TOKEN));

        storage.clear().unwrap();
        assert!(!storage.contains(keys::ACCESS_TOKEN));
        assert!(!storage.contains(keys::REFRESH_TOKEN));
    }
}
