//! Explicit name → handler tables for business artifacts.
//!
//! Aggregates and projectors register one function per message name up
//! front. Dispatch is a table lookup, and an unknown message name surfaces as
//! [`DomainError::MissingHandler`] instead of being silently skipped.

use std::collections::BTreeMap;

use folio_core::{DomainError, DomainResult};

use crate::{CommittedEvent, Message, Projection};

/// Handlers keyed by message name, resolved once at registration time.
#[derive(Debug, Clone)]
pub struct HandlerMap<H> {
    handlers: BTreeMap<String, H>,
}

impl<H> Default for HandlerMap<H> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<H> HandlerMap<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`. Each name can be registered once.
    pub fn register(&mut self, name: impl Into<String>, handler: H) -> DomainResult<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(DomainError::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> DomainResult<&H> {
        self.handlers
            .get(name)
            .ok_or_else(|| DomainError::missing_handler(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Maps a committed event to the read-model changes it implies.
pub type ProjectionFn = Box<dyn Fn(&CommittedEvent) -> Projection + Send + Sync>;

/// A named projector: one projection function per event name.
///
/// The registered names double as the `names` filter used when polling.
pub struct Projector {
    name: String,
    handlers: HandlerMap<ProjectionFn>,
}

impl core::fmt::Debug for Projector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Projector")
            .field("name", &self.name)
            .field("events", &self.handlers.names())
            .finish()
    }
}

impl Projector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HandlerMap::new(),
        }
    }

    pub fn on<F>(mut self, event: impl Into<String>, f: F) -> DomainResult<Self>
    where
        F: Fn(&CommittedEvent) -> Projection + Send + Sync + 'static,
    {
        self.handlers.register(event, Box::new(f))?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> Vec<String> {
        self.handlers.names()
    }

    pub fn project(&self, event: &CommittedEvent) -> DomainResult<Projection> {
        let f = self.handlers.resolve(&event.name)?;
        Ok(f(event))
    }
}

/// Contract business aggregates satisfy to be driven through the event store.
///
/// - `apply` evolves state from one committed event of the aggregate's stream
/// - `handle` decides which events a command produces; it must not mutate state
pub trait Aggregate: Send + Sync {
    type State: Default + Send;

    /// Name of the stream holding this aggregate's events.
    fn stream(&self) -> String;

    fn apply(&self, state: &mut Self::State, event: &CommittedEvent) -> DomainResult<()>;

    fn handle(&self, state: &Self::State, command: &Message) -> DomainResult<Vec<Message>>;
}

pub type ReducerFn<S> = Box<dyn Fn(&mut S, &CommittedEvent) + Send + Sync>;
pub type CommandFn<S> = Box<dyn Fn(&S, &Message) -> DomainResult<Vec<Message>> + Send + Sync>;

/// An [`Aggregate`] assembled from reducer and command tables.
pub struct AggregateTable<S> {
    stream: String,
    reducers: HandlerMap<ReducerFn<S>>,
    commands: HandlerMap<CommandFn<S>>,
}

impl<S> AggregateTable<S> {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            reducers: HandlerMap::new(),
            commands: HandlerMap::new(),
        }
    }

    pub fn reduce<F>(mut self, event: impl Into<String>, f: F) -> DomainResult<Self>
    where
        F: Fn(&mut S, &CommittedEvent) + Send + Sync + 'static,
    {
        self.reducers.register(event, Box::new(f))?;
        Ok(self)
    }

    pub fn command<F>(mut self, command: impl Into<String>, f: F) -> DomainResult<Self>
    where
        F: Fn(&S, &Message) -> DomainResult<Vec<Message>> + Send + Sync + 'static,
    {
        self.commands.register(command, Box::new(f))?;
        Ok(self)
    }
}

impl<S> Aggregate for AggregateTable<S>
where
    S: Default + Send,
{
    type State = S;

    fn stream(&self) -> String {
        self.stream.clone()
    }

    fn apply(&self, state: &mut S, event: &CommittedEvent) -> DomainResult<()> {
        let reducer = self.reducers.resolve(&event.name)?;
        reducer(state, event);
        Ok(())
    }

    fn handle(&self, state: &S, command: &Message) -> DomainResult<Vec<Message>> {
        let f = self.commands.resolve(&command.name)?;
        f(state, command)
    }
}
