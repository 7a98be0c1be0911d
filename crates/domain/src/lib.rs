//! # sakit-domain
//!
//! Pure domain model for the sakit local persistence layer.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **credential records** (one enrolled passkey and its metadata)
//! - Define **partial credential updates** that can never touch immutable fields
//! - Define the **session record** (the singleton active session)
//! - Define the **storage error taxonomy** shared by every backend
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod credential;
pub mod session;
