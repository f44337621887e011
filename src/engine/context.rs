use super::core::Core;
use super::events::Continuation;
use super::{Event, EventHandle, Process, ProcessId, ProcessStatus, Resource, ResourceId, Store, StoreId};
use crate::rate_limiter::{FixedWindowLimiter, LimiterId};

/// Access to the engine from inside a running process step or callback event.
///
/// Everything reachable through a [`Context`] takes effect immediately and never suspends the caller: suspension is
/// requested only by returning a [`Step`]. Operations that act on behalf of "the caller," such as [`release()`], use
/// the process currently being resumed; callback events have no such process.
///
/// [`Step`]: crate::Step
/// [`release()`]: Context::release
pub struct Context<'a, State, Item> {
    core: &'a mut Core<State, Item>,
    current: Option<ProcessId>,
}

impl<'a, State, Item> Context<'a, State, Item> {
    pub(crate) fn new(core: &'a mut Core<State, Item>, current: Option<ProcessId>) -> Self {
        Self { core, current }
    }

    /// The simulation's current clock time.
    pub fn now(&self) -> f64 {
        self.core.now()
    }

    /// The process being resumed, or `None` inside a callback event.
    pub fn current(&self) -> Option<ProcessId> {
        self.current
    }

    /// Schedule a callback event after the specified delay.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDelay`] for a negative, NaN or infinite delay.
    ///
    /// [`Error::InvalidDelay`]: crate::Error::InvalidDelay
    pub fn schedule<EventType>(&mut self, delay: f64, event: EventType) -> crate::Result<EventHandle>
    where
        EventType: Event<State, Item> + 'static,
    {
        self.core.schedule(delay, Continuation::Call(Box::new(event)))
    }

    /// Withdraw a callback event before it fires.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownHandle`] if the event already fired or was cancelled.
    ///
    /// [`Error::UnknownHandle`]: crate::Error::UnknownHandle
    pub fn cancel(&mut self, handle: EventHandle) -> crate::Result {
        self.core.cancel(handle)
    }

    /// Spawn a new process. It starts at the current time, after every event already due now.
    pub fn spawn<ProcessType>(&mut self, process: ProcessType) -> crate::Result<ProcessId>
    where
        ProcessType: Process<State, Item> + 'static,
    {
        self.core.spawn(Box::new(process))
    }

    /// Abort another process. See [`Simulation::abort()`].
    ///
    /// [`Simulation::abort()`]: crate::Simulation::abort
    pub fn abort(&mut self, process: ProcessId) -> crate::Result {
        self.core.abort(process)
    }

    /// Release one unit of `resource` held by the current process. If a request is waiting, the unit is granted to it
    /// within this same step and its process is resumed at the current time.
    ///
    /// # Errors
    ///
    /// [`Error::NotHeld`] if the current process holds no unit of `resource`, or if called from a callback event.
    /// Nothing is modified in that case.
    ///
    /// [`Error::NotHeld`]: crate::Error::NotHeld
    pub fn release(&mut self, resource: ResourceId) -> crate::Result {
        self.core.release(self.current, resource)
    }

    /// Produce an item into a store. A waiting consumer receives it directly; otherwise it is buffered.
    pub fn put(&mut self, store: StoreId, item: Item) -> crate::Result {
        self.core.put(store, item)
    }

    /// Lifecycle state of any process.
    pub fn status(&self, process: ProcessId) -> Option<ProcessStatus> {
        self.core.status(process)
    }

    /// Number of processes that have not terminated yet, including the caller.
    pub fn live_processes(&self) -> usize {
        self.core.live_processes()
    }

    /// Number of events waiting to fire.
    pub fn pending_events(&self) -> usize {
        self.core.queue.len()
    }

    /// Read-only view of a resource.
    pub fn resource(&self, resource: ResourceId) -> Option<&Resource> {
        self.core.resources.get(resource.index())
    }

    /// Read-only view of a store.
    pub fn store(&self, store: StoreId) -> Option<&Store<Item>> {
        self.core.stores.get(store.index())
    }

    /// Read-only view of a rate limiter.
    pub fn limiter(&self, limiter: LimiterId) -> Option<&FixedWindowLimiter> {
        self.core.limiters.get(limiter.index())
    }

    pub(crate) fn other_live_samplers(&self) -> usize {
        self.core.other_live_samplers(self.current)
    }

    pub(crate) fn limiter_mut(&mut self, limiter: LimiterId) -> crate::Result<&mut FixedWindowLimiter> {
        self.core.limiter_mut(limiter)
    }

    pub(crate) fn record_snapshot(&mut self) {
        let snapshot = crate::metrics::Snapshot::capture(self.core);
        self.core.samples.push(snapshot);
    }
}
