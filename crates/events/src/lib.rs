//! Event and projection model shared by stores, brokers and business artifacts.

pub mod committed;
pub mod handler;
pub mod message;
pub mod projection;

pub use committed::{
    Actor, Causation, CommandCausation, CommittedEvent, EventCausation, EventMetadata,
};
pub use handler::{Aggregate, AggregateTable, CommandFn, HandlerMap, ProjectionFn, Projector, ReducerFn};
pub use message::Message;
pub use projection::{
    CommitCount, Condition, Delete, Operator, Projection, ProjectionQuery, ProjectionRecord,
    ProjectionResults, State, Upsert,
};
