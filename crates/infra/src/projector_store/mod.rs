//! Watermark-gated read model storage.

pub mod condition;
pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryProjectorStore;
pub use r#trait::{ProjectorStore, ProjectorStoreError};
