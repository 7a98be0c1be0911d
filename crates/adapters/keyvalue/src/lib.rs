//! # sakit-adapter-keyvalue
//!
//! [`StorageAdapter`](sakit_app::ports::StorageAdapter) over a plain
//! string-to-string store.
//!
//! All credentials are kept as one JSON array under [`CREDENTIALS_KEY`] and
//! the session as one JSON object under [`SESSION_KEY`]. There are no
//! indexes: lookups scan the whole array, which is fine for the handful of
//! passkeys a wallet holds.
//!
//! Two engines are provided: [`MemoryKeyValue`] and [`FileKeyValue`] (one file
//! per key in a directory). Any other engine plugs in through
//! [`KeyValueBackend`].

pub mod backend;
pub mod error;
pub mod storage;

pub use backend::{FileKeyValue, KeyValueBackend, MemoryKeyValue};
pub use error::KeyValueError;
pub use storage::{CREDENTIALS_KEY, KeyValueStorage, SESSION_KEY};
