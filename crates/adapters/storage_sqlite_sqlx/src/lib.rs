//! # sakit-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the [`StorageAdapter`](sakit_app::ports::StorageAdapter) port
//!   defined in `sakit-app`
//! - Open the database lazily, once, and share the pool between operations
//! - Migrate the schema additively, version by version
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `sakit-app` (for the port trait) and `sakit-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod config;
pub mod connection;
mod credential_store;
pub mod error;
pub mod migrations;
mod session_store;
pub mod storage;

pub use config::{Config, ConfigError};
pub use connection::ConnectionManager;
pub use error::SqliteError;
pub use storage::SqliteStorage;
