use super::ProcessId;

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

/// Identifies a resource created with [`Simulation::new_resource()`].
///
/// [`Simulation::new_resource()`]: crate::Simulation::new_resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceId(usize);

impl ResourceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the resource in creation order, starting at zero.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "resource #{}", self.0)
    }
}

/// An unresolved request for one unit of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceRequest {
    /// The process waiting for the unit.
    pub requester: ProcessId,
    /// Virtual time at which the request was made.
    pub submitted_at: f64,
}

/// Counters and wait-time samples collected by a [`Resource`] over a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceStats {
    /// Number of requests submitted, granted or not.
    pub requests: u64,
    /// Number of units handed out.
    pub grants: u64,
    /// Number of units handed back.
    pub releases: u64,
    /// Time each granted request spent in the wait queue, in grant order. Immediate grants record zero.
    pub wait_times: Vec<f64>,
    /// Longest the wait queue has ever been.
    pub max_queue_len: usize,
}

impl ResourceStats {
    /// Average of [`wait_times`], or `None` before the first grant.
    ///
    /// [`wait_times`]: ResourceStats::wait_times
    pub fn mean_wait(&self) -> Option<f64> {
        if self.wait_times.is_empty() {
            None
        } else {
            Some(self.wait_times.iter().sum::<f64>() / self.wait_times.len() as f64)
        }
    }

    /// Longest recorded wait, or `None` before the first grant.
    pub fn max_wait(&self) -> Option<f64> {
        self.wait_times.iter().copied().reduce(f64::max)
    }
}

/// A capacity-bounded contention point with a strict FIFO wait list, e.g. a pool of nurses or database connections.
///
/// Capacity is undifferentiated: whichever unresolved request was submitted first is granted first whenever a unit
/// frees up. Units are tracked per holder so that only a process that actually holds one can release it.
///
/// Invariant: `0 ≤ held() ≤ capacity()` in every reachable state.
#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    capacity: usize,
    holders: Vec<ProcessId>,
    wait_queue: VecDeque<ResourceRequest>,
    stats: ResourceStats,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, capacity: usize) -> crate::Result<Self> {
        if capacity == 0 {
            return Err(crate::Error::InvalidCapacity(format!(
                "{id} needs a capacity of at least one unit"
            )));
        }

        Ok(Self {
            id,
            capacity,
            holders: Vec::with_capacity(capacity),
            wait_queue: VecDeque::new(),
            stats: ResourceStats::default(),
        })
    }

    /// Submit a request on behalf of `requester`. Returns `true` if a unit was granted straight away, otherwise the
    /// request joins the tail of the wait queue.
    pub(crate) fn request(&mut self, requester: ProcessId, now: f64) -> bool {
        self.stats.requests += 1;
        if self.holders.len() < self.capacity && self.wait_queue.is_empty() {
            self.grant(requester, now, now);
            return true;
        }

        self.wait_queue.push_back(ResourceRequest {
            requester,
            submitted_at: now,
        });
        self.stats.max_queue_len = self.stats.max_queue_len.max(self.wait_queue.len());
        false
    }

    /// Hand back one unit held by `holder`, granting it to the head of the wait queue if anyone is waiting. Returns the
    /// newly granted process.
    ///
    /// # Errors
    ///
    /// [`Error::NotHeld`] if `holder` holds no unit; nothing is modified in that case.
    ///
    /// [`Error::NotHeld`]: crate::Error::NotHeld
    pub(crate) fn release(&mut self, holder: ProcessId, now: f64) -> crate::Result<Option<ProcessId>> {
        let position = self
            .holders
            .iter()
            .position(|candidate| *candidate == holder)
            .ok_or(crate::Error::NotHeld(self.id))?;
        self.holders.remove(position);
        self.stats.releases += 1;
        Ok(self.grant_next(now))
    }

    /// Hand back every unit held by `holder`, returning the processes granted as a result in grant order.
    pub(crate) fn release_all(&mut self, holder: ProcessId, now: f64) -> Vec<ProcessId> {
        let before = self.holders.len();
        self.holders.retain(|candidate| *candidate != holder);
        self.stats.releases += (before - self.holders.len()) as u64;

        std::iter::from_fn(|| self.grant_next(now)).collect()
    }

    /// Remove the pending request of `requester` from the wait queue. Returns whether one was found.
    pub(crate) fn withdraw(&mut self, requester: ProcessId) -> bool {
        let before = self.wait_queue.len();
        self.wait_queue.retain(|request| request.requester != requester);
        before != self.wait_queue.len()
    }

    fn grant_next(&mut self, now: f64) -> Option<ProcessId> {
        if self.holders.len() >= self.capacity {
            return None;
        }

        let request = self.wait_queue.pop_front()?;
        self.grant(request.requester, request.submitted_at, now);
        Some(request.requester)
    }

    fn grant(&mut self, requester: ProcessId, submitted_at: f64, now: f64) {
        self.holders.push(requester);
        self.stats.grants += 1;
        self.stats.wait_times.push(now - submitted_at);
        debug_assert!(self.holders.len() <= self.capacity, "resource over capacity");
    }

    /// Identifier of this resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Maximum number of units that can be held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of units currently held.
    pub fn held(&self) -> usize {
        self.holders.len()
    }

    /// Number of requests waiting for a unit.
    pub fn queue_len(&self) -> usize {
        self.wait_queue.len()
    }

    /// Whether `process` holds at least one unit.
    pub fn is_held_by(&self, process: ProcessId) -> bool {
        self.holders.contains(&process)
    }

    /// Unresolved requests, oldest first.
    pub fn waiting(&self) -> impl Iterator<Item = &ResourceRequest> {
        self.wait_queue.iter()
    }

    /// Counters and wait-time samples collected so far.
    pub fn stats(&self) -> &ResourceStats {
        &self.stats
    }
}
