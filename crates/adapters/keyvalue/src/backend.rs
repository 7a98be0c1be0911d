//! Key-value engines.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncWriteExt;

use sakit_domain::error::StorageError;

use crate::error::KeyValueError;

/// A string-to-string store.
///
/// Writes must be all-or-nothing: a reader sees either the previous value or
/// the new one.
pub trait KeyValueBackend {
    /// Read the value under `key`, if any.
    fn get_item(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, KeyValueError>> + Send;

    /// Replace the value under `key`.
    fn set_item(
        &self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), KeyValueError>> + Send;

    /// Remove `key`. Removing a missing key is a no-op.
    fn remove_item(&self, key: &str) -> impl Future<Output = Result<(), KeyValueError>> + Send;
}

/// Volatile engine backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryKeyValue {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueBackend for MemoryKeyValue {
    fn get_item(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, KeyValueError>> + Send {
        let result = self.lock().get(key).cloned();
        async { Ok(result) }
    }

    fn set_item(
        &self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), KeyValueError>> + Send {
        self.lock().insert(key.to_string(), value);
        async { Ok(()) }
    }

    fn remove_item(&self, key: &str) -> impl Future<Output = Result<(), KeyValueError>> + Send {
        self.lock().remove(key);
        async { Ok(()) }
    }
}

/// Durable engine storing each key as a file inside one directory.
///
/// Values are written to a temporary file, synced, then renamed over the
/// target, so a crash never leaves a partially written value behind.
#[derive(Debug)]
pub struct FileKeyValue {
    directory: PathBuf,
    temp_counter: AtomicU64,
}

impl FileKeyValue {
    /// Use `directory` as the store, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the directory cannot be
    /// created.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| KeyValueError::Directory {
                path: directory.clone(),
                source,
            })?;
        tracing::debug!(directory = %directory.display(), "opened key-value directory");
        Ok(Self {
            directory,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Directory holding the files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.directory.join(file_name(key))
    }
}

/// File name for `key`, percent-encoded so any key maps to one flat file.
fn file_name(key: &str) -> String {
    format!("{}.json", urlencoding::encode(key))
}

impl KeyValueBackend for FileKeyValue {
    async fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueError> {
        let path = self.path_of(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KeyValueError::Io { path, source }),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), KeyValueError> {
        let path = self.path_of(key);
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = self.directory.join(format!("{}.{n}.tmp", file_name(key)));

        let written: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(value.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp, &path).await
        }
        .await;

        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(KeyValueError::Io { path, source });
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), KeyValueError> {
        let path = self.path_of(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(KeyValueError::Io { path, source }),
        }
    }
}
