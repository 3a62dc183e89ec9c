//! Infrastructure layer: event store, projector store, broker and config.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projector_store;
pub mod workers;

pub use config::BrokerConfig;
pub use workers::{Broker, EventHandler, ProjectorHandler};
