//! Sequential action loop: a named FIFO of async actions run one at a time.
//!
//! - `push` enqueues an action and (re)starts the drain if idle
//! - delayed pushes are debounced by action id (a newer push replaces the timer)
//! - `stop` lets the in-flight action finish (bounded wait), then drops the
//!   queue and all pending timers
//!
//! The loop spawns onto the ambient tokio runtime; call it from within one.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub type ActionFuture = Pin<Box<dyn Future<Output = Option<bool>> + Send>>;
type ActionFn = Box<dyn FnOnce() -> ActionFuture + Send>;
type ActionCallback = Box<dyn FnOnce(&str, Option<bool>) + Send>;

/// A unit of work for an [`ActionLoop`].
pub struct Action {
    id: String,
    action: ActionFn,
    callback: Option<ActionCallback>,
    delay: Option<Duration>,
}

impl core::fmt::Debug for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl Action {
    pub fn new<F, Fut>(id: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<bool>> + Send + 'static,
    {
        Self {
            id: id.into(),
            action: Box::new(move || Box::pin(action())),
            callback: None,
            delay: None,
        }
    }

    /// Invoked with the action id and result once the action completes.
    pub fn with_callback<C>(mut self, callback: C) -> Self
    where
        C: FnOnce(&str, Option<bool>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Enqueue only after `delay`, replacing any pending delayed action with the same id.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopStatus {
    Running,
    Stopping,
    Stopped,
}

/// How long `stop` waits for the in-flight action: `ticks` checks, `tick` apart.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StopPolicy {
    pub ticks: u32,
    pub tick: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            ticks: 30,
            tick: Duration::from_secs(1),
        }
    }
}

struct LoopState {
    queue: VecDeque<Action>,
    /// Debounce timers by action id, tagged with a generation.
    pending: HashMap<String, (u64, JoinHandle<()>)>,
    next_timer: u64,
    status: LoopStatus,
    /// Whether a drain task is alive.
    running: bool,
}

/// Cloneable handle to a named sequential loop.
#[derive(Clone)]
pub struct ActionLoop {
    name: Arc<str>,
    state: Arc<Mutex<LoopState>>,
    stop_policy: StopPolicy,
}

impl core::fmt::Debug for ActionLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock();
        f.debug_struct("ActionLoop")
            .field("name", &self.name)
            .field("status", &state.status)
            .field("queued", &state.queue.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl ActionLoop {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            state: Arc::new(Mutex::new(LoopState {
                queue: VecDeque::new(),
                pending: HashMap::new(),
                next_timer: 0,
                status: LoopStatus::Stopped,
                running: false,
            })),
            stop_policy: StopPolicy::default(),
        }
    }

    pub fn with_stop_policy(mut self, stop_policy: StopPolicy) -> Self {
        self.stop_policy = stop_policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> LoopStatus {
        self.lock().status
    }

    /// Whether the loop is not currently running.
    pub fn stopped(&self) -> bool {
        self.status() != LoopStatus::Running
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, mut action: Action) {
        let Some(delay) = action.delay.take() else {
            self.enqueue(action);
            return;
        };

        let mut state = self.lock();
        let id = action.id.clone();
        if let Some((_, previous)) = state.pending.remove(&id) {
            previous.abort();
        }
        let generation = state.next_timer;
        state.next_timer += 1;

        let this = self.clone();
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fire = {
                let mut state = this.lock();
                match state.pending.get(&timer_id) {
                    Some((g, _)) if *g == generation => {
                        state.pending.remove(&timer_id);
                        true
                    }
                    _ => false,
                }
            };
            if fire {
                this.enqueue(action);
            }
        });
        state.pending.insert(id, (generation, timer));
    }

    fn enqueue(&self, action: Action) {
        let start = {
            let mut state = self.lock();
            state.queue.push_back(action);
            state.status = LoopStatus::Running;
            !std::mem::replace(&mut state.running, true)
        };
        if start {
            tokio::spawn(self.clone().drain());
        }
    }

    async fn drain(self) {
        loop {
            let next = {
                let mut state = self.lock();
                let next = match state.status {
                    LoopStatus::Stopping => None,
                    _ => state.queue.pop_front(),
                };
                if next.is_none() {
                    state.status = LoopStatus::Stopped;
                    state.running = false;
                }
                next
            };
            let Some(Action {
                id,
                action,
                callback,
                ..
            }) = next
            else {
                break;
            };

            let result = action().await;
            if let Some(callback) = callback {
                callback(&id, result);
            }
        }
    }

    /// Stop the loop in bounded time.
    ///
    /// When actions are queued, waits (per [`StopPolicy`]) for the in-flight
    /// one to finish. The queue and pending timers are dropped regardless, and
    /// the loop can be restarted with another `push`. Returns the number of
    /// queued actions that were discarded.
    pub async fn stop(&self) -> usize {
        let wait = {
            let mut state = self.lock();
            if !state.queue.is_empty() && state.status == LoopStatus::Running {
                state.status = LoopStatus::Stopping;
                true
            } else {
                false
            }
        };

        if wait {
            for tick in 1..=self.stop_policy.ticks {
                if self.status() != LoopStatus::Stopping {
                    break;
                }
                trace!(name = %self.name, tick, "stopping loop");
                tokio::time::sleep(self.stop_policy.tick).await;
            }
        }

        let mut state = self.lock();
        if state.status == LoopStatus::Stopping {
            warn!(name = %self.name, "loop did not drain in time; dropping queued actions");
            state.status = LoopStatus::Stopped;
        }
        let dropped = state.queue.len();
        let cancelled = state.pending.len();
        if dropped > 0 || cancelled > 0 {
            debug!(name = %self.name, dropped, cancelled, "discarding actions on stop");
        }
        state.queue.clear();
        for (_, (_, timer)) in state.pending.drain() {
            timer.abort();
        }
        dropped
    }
}
