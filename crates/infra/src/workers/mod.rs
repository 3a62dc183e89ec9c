//! Background drivers: the sequential action loop and the broker built on it.

pub mod action_loop;
pub mod broker;
pub mod consumer;

pub use action_loop::{Action, ActionLoop, LoopStatus, StopPolicy};
pub use broker::Broker;
pub use consumer::{EventHandler, ProjectorHandler};
