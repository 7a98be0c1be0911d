//! Connection lifecycle: lazy, memoized open of the `SQLite` pool.
//!
//! The first caller of [`ConnectionManager::open`] starts one open sequence
//! (prepare the directory, connect, migrate). Every caller arriving while it
//! runs awaits the same shared future, so migrations run once per open. A
//! failed sequence is reported to everyone waiting on it and then forgotten:
//! the next call starts over.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use sqlx::SqlitePool;

use sakit_domain::error::StorageError;

use crate::config::Config;
use crate::error::SqliteError;
use crate::migrations;

type OpenFuture = Shared<BoxFuture<'static, Result<SqlitePool, OpenFailure>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Unavailable,
    Open,
}

/// Outcome of a failed open sequence, shared between all of its waiters.
#[derive(Debug, Clone)]
struct OpenFailure {
    kind: FailureKind,
    error: Arc<SqliteError>,
}

impl OpenFailure {
    fn unavailable(error: SqliteError) -> Self {
        Self {
            kind: FailureKind::Unavailable,
            error: Arc::new(error),
        }
    }

    fn open(error: SqliteError) -> Self {
        Self {
            kind: FailureKind::Open,
            error: Arc::new(error),
        }
    }
}

impl From<OpenFailure> for StorageError {
    fn from(failure: OpenFailure) -> Self {
        match failure.kind {
            FailureKind::Unavailable => Self::unavailable(failure.error),
            FailureKind::Open => Self::open(failure.error),
        }
    }
}

enum State {
    Unopened,
    Opening(OpenFuture),
    Open(SqlitePool),
    Failed(OpenFailure),
}

/// Owns the pool of one database and its open/close/destroy lifecycle.
pub struct ConnectionManager {
    config: Config,
    state: Mutex<State>,
    attempts: AtomicUsize,
}

impl ConnectionManager {
    /// Create a manager for `config`. Nothing is opened yet.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(State::Unopened),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Configuration this manager opens.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of open sequences started so far.
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether a pool is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), State::Open(_))
    }

    /// Error of the last open sequence, if it failed and nothing has
    /// replaced it since. The next [`open`](Self::open) retries regardless.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<SqliteError>> {
        match &*self.lock() {
            State::Failed(failure) => Some(Arc::clone(&failure.error)),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the open pool, opening and migrating the database first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the database location cannot
    /// be prepared, or [`StorageError::Open`] if connecting or migrating
    /// fails.
    pub async fn open(&self) -> Result<SqlitePool, StorageError> {
        let future = {
            let mut state = self.lock();
            let in_flight = match &*state {
                State::Open(pool) => return Ok(pool.clone()),
                State::Opening(future) => Some(future.clone()),
                State::Unopened | State::Failed(_) => None,
            };
            if let Some(future) = in_flight {
                future
            } else {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                let future = establish(self.config.clone()).boxed().shared();
                *state = State::Opening(future.clone());
                future
            }
        };

        let result = future.clone().await;

        let mut state = self.lock();
        // A close() may have raced us; only settle the sequence we awaited.
        let settles = matches!(&*state, State::Opening(current) if current.ptr_eq(&future));
        if settles {
            *state = match &result {
                Ok(pool) => State::Open(pool.clone()),
                Err(failure) => State::Failed(failure.clone()),
            };
        }
        drop(state);

        result.map_err(StorageError::from)
    }

    /// Close the pool. The next [`open`](Self::open) reopens it.
    ///
    /// An open sequence still in flight is awaited and its pool closed.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock(), State::Unopened);
        match previous {
            State::Open(pool) => {
                tracing::debug!(url = %self.config.database_url, "closing database");
                pool.close().await;
            }
            State::Opening(future) => {
                tracing::debug!(url = %self.config.database_url, "closing database while opening");
                if let Ok(pool) = future.await {
                    pool.close().await;
                }
            }
            State::Unopened | State::Failed(_) => {}
        }
    }

    /// Delete the database files from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Operation`] wrapping
    /// [`SqliteError::DatabaseInUse`] while a connection is open or opening,
    /// or [`SqliteError::Remove`] if a file cannot be deleted.
    pub async fn destroy(&self) -> Result<(), StorageError> {
        let in_use = matches!(*self.lock(), State::Open(_) | State::Opening(_));
        if in_use {
            return Err(SqliteError::DatabaseInUse.into());
        }

        let Some(path) = self.config.database_path() else {
            return Ok(());
        };
        tracing::debug!(path = %path.display(), "destroying database");

        for file in database_files(path) {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(SqliteError::Remove { path: file, source }.into()),
            }
        }
        Ok(())
    }
}

/// Main database file followed by its journal sidecars.
fn database_files(path: PathBuf) -> [PathBuf; 3] {
    let sidecar = |suffix: &str| {
        let mut name = path.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    let wal = sidecar("-wal");
    let shm = sidecar("-shm");
    [path, wal, shm]
}

async fn establish(config: Config) -> Result<SqlitePool, OpenFailure> {
    tracing::debug!(url = %config.database_url, "opening database");
    let result = try_establish(&config).await;
    if let Err(failure) = &result {
        tracing::warn!(
            url = %config.database_url,
            error = %failure.error,
            "failed to open database"
        );
    }
    result
}

async fn try_establish(config: &Config) -> Result<SqlitePool, OpenFailure> {
    if let Some(parent) = config
        .database_path()
        .as_deref()
        .and_then(std::path::Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await.map_err(|source| {
            OpenFailure::unavailable(SqliteError::Directory {
                path: parent.to_path_buf(),
                source,
            })
        })?;
    }

    let options = config.connect_options().map_err(OpenFailure::open)?;
    let pool = config
        .pool_options()
        .connect_with(options)
        .await
        .map_err(|err| OpenFailure::open(err.into()))?;

    match migrations::run(&pool).await {
        Ok(found) => {
            tracing::debug!(
                url = %config.database_url,
                from = found,
                to = migrations::SCHEMA_VERSION,
                "database ready"
            );
            Ok(pool)
        }
        Err(err) => {
            pool.close().await;
            Err(OpenFailure::open(err))
        }
    }
}
