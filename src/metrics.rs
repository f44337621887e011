//! Read-only views of the engine's queues, taken on demand or at a fixed interval.
//!
//! A [`Snapshot`] copies out the depth of every resource queue and store along with the state of every rate limiter,
//! so it can outlive the simulation it came from. The per-grant wait times and throttle samples are not copied; read
//! them from [`Resource::stats()`] and [`FixedWindowLimiter::stats()`] after the run instead.
//!
//! [`Resource::stats()`]: crate::Resource::stats
//! [`FixedWindowLimiter::stats()`]: crate::rate_limiter::FixedWindowLimiter::stats

use crate::engine::{Context, Core, Process, ProcessId, ResourceId, Step, StoreId, Wakeup};
use crate::rate_limiter::LimiterId;
use crate::{Error, SimState, Simulation};

/// One resource as it stood when a [`Snapshot`] was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    /// Total number of units.
    pub capacity: usize,
    /// Units currently granted.
    pub held: usize,
    /// Requests waiting for a unit.
    pub queue_len: usize,
    /// Requests granted so far, whether on the spot or after waiting.
    pub grants: u64,
}

/// One store as it stood when a [`Snapshot`] was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StoreSnapshot {
    pub id: StoreId,
    /// Items buffered and not yet taken.
    pub depth: usize,
    /// Consumers suspended on an empty store.
    pub waiting_consumers: usize,
    /// Items put so far.
    pub puts: u64,
}

/// One rate limiter as it stood when a [`Snapshot`] was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LimiterSnapshot {
    pub id: LimiterId,
    /// Start of the current window, aligned to a multiple of the window length.
    pub window_start: f64,
    /// Items processed in the current window.
    pub count_in_window: usize,
    /// Items processed over the whole run.
    pub processed: u64,
    /// How many times an item had to wait for the next window.
    pub throttle_count: usize,
}

/// The state of every queue in a simulation at one instant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Snapshot {
    /// Virtual time the snapshot was taken at.
    pub time: f64,
    /// Every resource, indexed by [`ResourceId`].
    pub resources: Vec<ResourceSnapshot>,
    /// Every store, indexed by [`StoreId`].
    pub stores: Vec<StoreSnapshot>,
    /// Every rate limiter, indexed by [`LimiterId`].
    pub limiters: Vec<LimiterSnapshot>,
    /// Processes that had not terminated yet.
    pub live_processes: usize,
    /// Events waiting to fire.
    pub pending_events: usize,
}

impl Snapshot {
    pub(crate) fn capture<State, Item>(core: &Core<State, Item>) -> Self {
        Self {
            time: core.now(),
            resources: core
                .resources
                .iter()
                .map(|resource| ResourceSnapshot {
                    id: resource.id(),
                    capacity: resource.capacity(),
                    held: resource.held(),
                    queue_len: resource.queue_len(),
                    grants: resource.stats().grants,
                })
                .collect(),
            stores: core
                .stores
                .iter()
                .map(|store| StoreSnapshot {
                    id: store.id(),
                    depth: store.len(),
                    waiting_consumers: store.waiting_consumers(),
                    puts: store.stats().puts,
                })
                .collect(),
            limiters: core
                .limiters
                .iter()
                .map(|limiter| LimiterSnapshot {
                    id: limiter.id(),
                    window_start: limiter.window().start(),
                    count_in_window: limiter.window().count(),
                    processed: limiter.stats().processed,
                    throttle_count: limiter.stats().throttle_waits.len(),
                })
                .collect(),
            live_processes: core.live_processes(),
            pending_events: core.queue.len(),
        }
    }

    /// The entry for one resource, if it existed when the snapshot was taken.
    pub fn resource(&self, id: ResourceId) -> Option<&ResourceSnapshot> {
        self.resources.get(id.index())
    }

    /// The entry for one store, if it existed when the snapshot was taken.
    pub fn store(&self, id: StoreId) -> Option<&StoreSnapshot> {
        self.stores.get(id.index())
    }

    /// The entry for one rate limiter, if it existed when the snapshot was taken.
    pub fn limiter(&self, id: LimiterId) -> Option<&LimiterSnapshot> {
        self.limiters.get(id.index())
    }
}

/// Built-in process behind [`Simulation::sample_every()`].
#[derive(Debug)]
struct PeriodicSampler {
    interval: f64,
}

impl<State, Item> Process<State, Item> for PeriodicSampler {
    fn resume(
        &mut self,
        _: Wakeup<Item>,
        _: &mut State,
        context: &mut Context<'_, State, Item>,
    ) -> crate::Result<Step> {
        context.record_snapshot();
        // every other live sampler keeps exactly one event queued; once those are all that is left, no model process
        // can ever run again
        if context.pending_events() <= context.other_live_samplers() {
            return Ok(Step::Finish);
        }
        Ok(Step::Timeout(self.interval))
    }
}

impl<State, Item> Simulation<State, Item>
where
    State: SimState,
{
    /// Capture the current state of every queue.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.core)
    }

    /// Spawn a process that appends a [`Snapshot`] to [`samples()`] now and then every `interval`, stopping once
    /// nothing but samplers is left that could ever run.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDelay`] unless `interval` is positive and finite; [`Error::Finished`] once the horizon has been
    /// reached.
    ///
    /// [`samples()`]: Simulation::samples
    pub fn sample_every(&mut self, interval: f64) -> crate::Result<ProcessId> {
        if !(interval > 0.0) || interval.is_infinite() {
            return Err(Error::InvalidDelay(interval));
        }
        let sampler = self.spawn(PeriodicSampler { interval })?;
        self.core.samplers.push(sampler);
        Ok(sampler)
    }

    /// Every snapshot recorded by [`sample_every()`] samplers, in time order.
    ///
    /// [`sample_every()`]: Simulation::sample_every
    pub fn samples(&self) -> &[Snapshot] {
        &self.core.samples
    }
}
