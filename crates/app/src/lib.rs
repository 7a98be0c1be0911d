//! # sakit-app
//!
//! Application layer — **port definitions** (traits) for local persistence.
//!
//! ## Responsibilities
//! - Define the [`StorageAdapter`](ports::StorageAdapter) port that every
//!   backend implements: credential store, session store and connection
//!   teardown behind one contract
//! - Provide the behavioural conformance suite (feature `testing`) so each
//!   backend proves it honours the same semantics
//!
//! ## Dependency rule
//! Depends on `sakit-domain` only.
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod ports;

#[cfg(feature = "testing")]
pub mod testing;
