//! Append-only event store boundary.
//!
//! This module defines the store contract (commit / query / poll / ack) and
//! the in-memory reference engine. Durable backends implement the same
//! trait with the same atomicity and ordering guarantees.

pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use query::AllQuery;
pub use r#trait::{
    ActorConcurrencyError, ConcurrencyError, EventStore, EventStoreError, StoreStat, Subscription,
};
