use super::events::{Continuation, EventQueue};
use super::{
    EventHandle, Process, ProcessId, ProcessStatus, Resource, ResourceId, Step, Store, StoreId, Termination, Wakeup,
};
use crate::error::{Error, Handle};
use crate::metrics::Snapshot;
use crate::rate_limiter::{FixedWindowLimiter, LimiterId};

use tracing::{debug, warn};

/// What a suspended process is currently waiting on, so that it can be withdrawn on abort.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Wait {
    /// A queued event will resume the process: a timeout, its start, or a wakeup already granted to it.
    Event(EventHandle),
    Resource(ResourceId),
    Store(StoreId),
    Join(usize),
}

/// Counting join for [`Step::AwaitAll`].
#[derive(Debug, Clone)]
struct Join {
    waiter: ProcessId,
    children: Vec<ProcessId>,
    remaining: usize,
}

#[derive(Debug)]
struct ProcessSlot<State, Item> {
    /// Taken out while the process runs, dropped once it terminates.
    body: Option<Box<dyn Process<State, Item>>>,
    status: ProcessStatus,
    waiting_on: Option<Wait>,
    joiners: Vec<usize>,
}

/// Result of handing a [`Step`] to the engine.
pub(crate) enum Outcome<Item> {
    /// The request was satisfied on the spot; resume the process again right away.
    Continue(Wakeup<Item>),
    /// The process is parked until an event resumes it.
    Suspended,
    /// The process asked to terminate.
    Finished,
}

/// Everything a simulation owns apart from the model state: the clock and event queue, the process table, and the
/// shared structures processes contend on.
///
/// Kept separate from the model state so that a running process can borrow both at once.
#[derive(Debug)]
pub(crate) struct Core<State, Item> {
    pub(crate) queue: EventQueue<State, Item>,
    processes: Vec<ProcessSlot<State, Item>>,
    /// Processes that have not terminated yet.
    live: usize,
    joins: Vec<Option<Join>>,
    /// Indices of `joins` that are free for reuse.
    free_joins: Vec<usize>,
    /// Processes spawned by `sample_every`.
    pub(crate) samplers: Vec<ProcessId>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) stores: Vec<Store<Item>>,
    pub(crate) limiters: Vec<FixedWindowLimiter>,
    pub(crate) samples: Vec<Snapshot>,
    finished: bool,
}

impl<State, Item> Core<State, Item> {
    pub(crate) fn new(start_time: f64) -> Self {
        Self {
            queue: EventQueue::new(start_time),
            processes: Vec::new(),
            live: 0,
            joins: Vec::new(),
            free_joins: Vec::new(),
            samplers: Vec::new(),
            resources: Vec::new(),
            stores: Vec::new(),
            limiters: Vec::new(),
            samples: Vec::new(),
            finished: false,
        }
    }

    pub(crate) fn now(&self) -> f64 {
        self.queue.current_time()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn ensure_running(&self) -> crate::Result {
        if self.finished {
            return Err(Error::Finished);
        }
        Ok(())
    }

    pub(crate) fn schedule(
        &mut self,
        delay: f64,
        continuation: Continuation<State, Item>,
    ) -> crate::Result<EventHandle> {
        self.ensure_running()?;
        self.queue.schedule(delay, continuation)
    }

    pub(crate) fn cancel(&mut self, handle: EventHandle) -> crate::Result {
        match self.queue.withdraw(handle) {
            Some(Continuation::Call(event)) => {
                debug!(%handle, ?event, "cancelled event");
                Ok(())
            },
            Some(resumption) => {
                // process wakeups are owned by the engine; only abort may withdraw them
                self.queue.reinsert(handle, resumption);
                Err(Error::UnknownHandle(Handle::Event(handle)))
            },
            None => Err(Error::UnknownHandle(Handle::Event(handle))),
        }
    }

    pub(crate) fn spawn(&mut self, body: Box<dyn Process<State, Item>>) -> crate::Result<ProcessId> {
        self.ensure_running()?;
        let process = ProcessId::new(self.processes.len());
        let handle = self.queue.schedule_now(Continuation::Resume(process, Wakeup::Started));
        self.processes.push(ProcessSlot {
            body: Some(body),
            status: ProcessStatus::Created,
            waiting_on: Some(Wait::Event(handle)),
            joiners: Vec::new(),
        });
        self.live += 1;
        debug!(%process, time = self.now(), "spawned process");
        Ok(process)
    }

    pub(crate) fn status(&self, process: ProcessId) -> Option<ProcessStatus> {
        self.processes.get(process.index()).map(|slot| slot.status)
    }

    pub(crate) fn live_processes(&self) -> usize {
        self.live
    }

    /// Number of samplers other than `current` that are still alive. Each of them has exactly one event queued.
    pub(crate) fn other_live_samplers(&self, current: Option<ProcessId>) -> usize {
        self.samplers
            .iter()
            .filter(|sampler| Some(**sampler) != current)
            .filter(|sampler| self.status(**sampler).map_or(false, |status| !status.is_terminated()))
            .count()
    }

    fn slot_mut(&mut self, process: ProcessId) -> crate::Result<&mut ProcessSlot<State, Item>> {
        self.processes
            .get_mut(process.index())
            .ok_or(Error::UnknownHandle(Handle::Process(process)))
    }

    /// Take the body of a process out of the table so it can run. Returns `None` for a wakeup addressed to a process
    /// that has terminated since.
    pub(crate) fn begin(&mut self, process: ProcessId) -> crate::Result<Option<Box<dyn Process<State, Item>>>> {
        let slot = self.slot_mut(process)?;
        if slot.status.is_terminated() {
            return Ok(None);
        }

        let body = slot.body.take().ok_or(Error::ProcessRunning(process))?;
        slot.status = ProcessStatus::Running;
        slot.waiting_on = None;
        Ok(Some(body))
    }

    /// Put the body of a suspended process back into the table.
    pub(crate) fn park(&mut self, process: ProcessId, body: Box<dyn Process<State, Item>>) {
        if let Some(slot) = self.processes.get_mut(process.index()) {
            slot.body = Some(body);
        }
    }

    /// Register the suspension point a process asked for, or satisfy it on the spot.
    pub(crate) fn suspend(&mut self, process: ProcessId, step: Step) -> crate::Result<Outcome<Item>> {
        let now = self.now();
        let wait = match step {
            Step::Finish => return Ok(Outcome::Finished),
            Step::Timeout(delay) => {
                Wait::Event(self.queue.schedule(delay, Continuation::Resume(process, Wakeup::TimedOut))?)
            },
            Step::Request(resource_id) => {
                let resource = self
                    .resources
                    .get_mut(resource_id.index())
                    .ok_or(Error::UnknownHandle(Handle::Resource(resource_id)))?;
                if resource.request(process, now) {
                    debug!(%process, resource = %resource_id, time = now, "granted immediately");
                    return Ok(Outcome::Continue(Wakeup::Granted(resource_id)));
                }
                Wait::Resource(resource_id)
            },
            Step::Get(store_id) => {
                let store = self
                    .stores
                    .get_mut(store_id.index())
                    .ok_or(Error::UnknownHandle(Handle::Store(store_id)))?;
                if let Some(item) = store.get(process) {
                    return Ok(Outcome::Continue(Wakeup::Received(store_id, item)));
                }
                Wait::Store(store_id)
            },
            Step::AwaitAll(children) => match self.join(process, children)? {
                Some(join) => Wait::Join(join),
                None => return Ok(Outcome::Continue(Wakeup::Joined)),
            },
        };

        let slot = self.slot_mut(process)?;
        slot.status = ProcessStatus::Suspended;
        slot.waiting_on = Some(wait);
        Ok(Outcome::Suspended)
    }

    /// Set up a counting join over the children that are still alive. Returns `None` if all of them already
    /// terminated.
    fn join(&mut self, waiter: ProcessId, children: Vec<ProcessId>) -> crate::Result<Option<usize>> {
        let mut alive = Vec::with_capacity(children.len());
        for child in children {
            let slot = self
                .processes
                .get(child.index())
                .ok_or(Error::UnknownHandle(Handle::Process(child)))?;
            if !slot.status.is_terminated() && !alive.contains(&child) {
                alive.push(child);
            }
        }

        if alive.is_empty() {
            return Ok(None);
        }

        let join = match self.free_joins.pop() {
            Some(join) => join,
            None => {
                self.joins.push(None);
                self.joins.len() - 1
            },
        };
        for child in &alive {
            self.processes[child.index()].joiners.push(join);
        }
        self.joins[join] = Some(Join {
            waiter,
            remaining: alive.len(),
            children: alive,
        });
        Ok(Some(join))
    }

    /// Queue a wakeup for a suspended process at the current time.
    fn resume_now(&mut self, process: ProcessId, wakeup: Wakeup<Item>) {
        let handle = self.queue.schedule_now(Continuation::Resume(process, wakeup));
        if let Some(slot) = self.processes.get_mut(process.index()) {
            slot.waiting_on = Some(Wait::Event(handle));
        }
    }

    /// Release one unit of `resource_id` held by `holder`, granting it onward to the head waiter in the same step.
    pub(crate) fn release(&mut self, holder: Option<ProcessId>, resource_id: ResourceId) -> crate::Result {
        let now = self.now();
        let resource = self
            .resources
            .get_mut(resource_id.index())
            .ok_or(Error::UnknownHandle(Handle::Resource(resource_id)))?;
        let holder = holder.ok_or(Error::NotHeld(resource_id))?;

        if let Some(next) = resource.release(holder, now)? {
            debug!(process = %next, resource = %resource_id, time = now, "granted on release");
            self.resume_now(next, Wakeup::Granted(resource_id));
        }
        Ok(())
    }

    /// Produce an item into a store, handing it straight to a waiting consumer if there is one.
    pub(crate) fn put(&mut self, store_id: StoreId, item: Item) -> crate::Result {
        self.ensure_running()?;
        let store = self
            .stores
            .get_mut(store_id.index())
            .ok_or(Error::UnknownHandle(Handle::Store(store_id)))?;

        if let Some((consumer, item)) = store.put(item) {
            self.resume_now(consumer, Wakeup::Received(store_id, item));
        }
        Ok(())
    }

    /// Mark a process terminated and count it towards every join waiting on it. A failed process hands back every
    /// unit it holds, as an aborted one does.
    pub(crate) fn terminate(&mut self, process: ProcessId, reason: Termination) {
        match self.status(process) {
            Some(status) if !status.is_terminated() => {},
            _ => return,
        }

        match reason {
            Termination::Failed => {
                let released = self.release_held(process);
                if released > 0 {
                    warn!(%process, time = self.now(), released, "failed process gave back its resource units");
                }
            },
            Termination::Finished if self.resources.iter().any(|resource| resource.is_held_by(process)) => {
                warn!(%process, time = self.now(), "process finished while still holding resource units");
            },
            _ => {},
        }

        let slot = &mut self.processes[process.index()];
        slot.status = ProcessStatus::Terminated(reason);
        slot.waiting_on = None;
        slot.body = None;
        let joiners = std::mem::take(&mut slot.joiners);
        self.live -= 1;

        for join in joiners {
            let Some(state) = self.joins[join].as_mut() else {
                continue;
            };
            state.remaining -= 1;
            if state.remaining == 0 {
                let waiter = state.waiter;
                self.free_join(join);
                self.resume_now(waiter, Wakeup::Joined);
            }
        }
    }

    /// Drop a join, detaching it from any children still counted towards it, and make its slot reusable.
    fn free_join(&mut self, join: usize) {
        let Some(state) = self.joins[join].take() else {
            return;
        };
        for child in state.children {
            self.processes[child.index()].joiners.retain(|candidate| *candidate != join);
        }
        self.free_joins.push(join);
    }

    /// Hand back every unit `process` holds, granting each freed unit to the next FIFO waiter. Returns how many units
    /// were released.
    fn release_held(&mut self, process: ProcessId) -> usize {
        let now = self.now();
        let mut released = 0;
        let mut grants = Vec::new();
        for resource in &mut self.resources {
            let resource_id = resource.id();
            let held_before = resource.held();
            let granted = resource.release_all(process, now);
            released += held_before + granted.len() - resource.held();
            grants.extend(granted.into_iter().map(|next| (next, resource_id)));
        }
        for (next, resource_id) in grants {
            debug!(process = %next, resource = %resource_id, time = now, "granted on release");
            self.resume_now(next, Wakeup::Granted(resource_id));
        }
        released
    }

    /// Withdraw whatever a process is waiting on, release everything it holds, and terminate it.
    pub(crate) fn abort(&mut self, process: ProcessId) -> crate::Result {
        let slot = self.slot_mut(process)?;
        if slot.status.is_terminated() {
            return Err(Error::UnknownHandle(Handle::Process(process)));
        }
        if slot.body.is_none() {
            return Err(Error::ProcessRunning(process));
        }

        match slot.waiting_on.take() {
            Some(Wait::Event(handle)) => {
                if let Some(Continuation::Resume(_, Wakeup::Received(store_id, item))) = self.queue.withdraw(handle) {
                    // the item was already on its way to this process; give it back rather than lose it
                    if let Some((consumer, item)) = self.stores[store_id.index()].restore(item) {
                        self.resume_now(consumer, Wakeup::Received(store_id, item));
                    }
                }
            },
            Some(Wait::Resource(resource_id)) => {
                self.resources[resource_id.index()].withdraw(process);
            },
            Some(Wait::Store(store_id)) => {
                self.stores[store_id.index()].withdraw(process);
            },
            Some(Wait::Join(join)) => self.free_join(join),
            None => {},
        }

        self.release_held(process);
        debug!(%process, time = self.now(), "aborted process");
        self.terminate(process, Termination::Aborted);
        Ok(())
    }

    /// Stop the run at `horizon`: discard every pending event, force-terminate every live process, and move the clock
    /// to the horizon.
    pub(crate) fn finish(&mut self, horizon: f64) {
        let discarded = self.queue.clear();
        let mut terminated = 0;
        for slot in self.processes.iter_mut().filter(|slot| !slot.status.is_terminated()) {
            slot.status = ProcessStatus::Terminated(Termination::Horizon);
            slot.waiting_on = None;
            slot.body = None;
            slot.joiners.clear();
            terminated += 1;
        }
        self.live = 0;
        self.joins.clear();
        self.free_joins.clear();
        self.queue.advance_to(horizon);
        self.finished = true;
        debug!(horizon, discarded, terminated, "reached horizon");
    }

    pub(crate) fn limiter_mut(&mut self, limiter_id: LimiterId) -> crate::Result<&mut FixedWindowLimiter> {
        self.limiters
            .get_mut(limiter_id.index())
            .ok_or(Error::UnknownHandle(Handle::Limiter(limiter_id)))
    }
}
