//! `folio-core`: storage-agnostic building blocks shared by the event and
//! projection stores.
//!
//! This crate contains **pure** primitives (no IO, no async).

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::Lease;
pub use version::ExpectedVersion;
