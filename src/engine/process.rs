use super::{Context, ResourceId, StoreId};

use std::fmt::{Debug, Display, Formatter};

/// Identifies a process spawned into a [`Simulation`].
///
/// [`Simulation`]: crate::Simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessId(usize);

impl ProcessId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the process in spawn order, starting at zero.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for ProcessId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "process #{}", self.0)
    }
}

/// Why a process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    /// The process returned [`Step::Finish`].
    Finished,
    /// The process was withdrawn from outside via `abort`.
    Aborted,
    /// The run reached its horizon while the process was still alive.
    Horizon,
    /// A step of the process returned an error.
    Failed,
}

/// Lifecycle of a process: `Created → Running → Suspended → Running → … → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProcessStatus {
    /// Spawned, waiting for its [`Wakeup::Started`] event to fire.
    Created,
    /// Executing a step right now. At most one process is ever in this state.
    Running,
    /// Waiting on a timeout, a resource grant, a store item, or a set of sub-processes.
    Suspended,
    /// Will never run again.
    Terminated(Termination),
}

impl ProcessStatus {
    /// Whether the process has stopped for good.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// The value a process is resumed with, describing which awaited condition was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum Wakeup<Item> {
    /// First resumption after the process was spawned.
    Started,
    /// A [`Step::Timeout`] elapsed.
    TimedOut,
    /// A unit of the resource was granted; the process now holds it and must eventually release it.
    Granted(ResourceId),
    /// An item was taken from the store.
    Received(StoreId, Item),
    /// Every process named in a [`Step::AwaitAll`] has terminated.
    Joined,
}

impl<Item> Wakeup<Item> {
    /// Short name of the wakeup, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::TimedOut => "timed out",
            Self::Granted(_) => "granted",
            Self::Received(..) => "received",
            Self::Joined => "joined",
        }
    }

    /// Take the store item out of a [`Wakeup::Received`].
    pub fn into_item(self) -> Option<Item> {
        match self {
            Self::Received(_, item) => Some(item),
            _ => None,
        }
    }
}

/// The suspension point a process asks for at the end of a step.
///
/// A step that can be satisfied straight away (free capacity, a buffered item, sub-processes that all finished
/// already) does not suspend at all: the engine resumes the process again within the same scheduling step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Sleep for the given nonnegative delay.
    Timeout(f64),
    /// Wait for one unit of the resource. FIFO among all requesters of that resource.
    Request(ResourceId),
    /// Wait for the next item of the store. FIFO among all consumers of that store.
    Get(StoreId),
    /// Wait until every listed process has terminated, for any reason.
    AwaitAll(Vec<ProcessId>),
    /// Terminate the process.
    Finish,
}

/// A cooperative unit of simulated activity.
///
/// A process is written as an explicit state machine: the engine calls [`resume()`] with a [`Wakeup`] describing why
/// the process is running again, the process does its work for that step, and it answers with the [`Step`] it wants
/// to wait on next. Exactly one process body executes between any two suspension points, so model state can be
/// mutated freely without locks.
///
/// Requiring implementors to be [`Debug`] enables printing the process table when diagnosing a model.
///
/// [`resume()`]: Process::resume
pub trait Process<State, Item>: Debug {
    /// Run one step of the process.
    ///
    /// Non-suspending operations, such as releasing a resource, putting an item into a store or spawning a
    /// sub-process, go through `context`; they take effect immediately and report failures synchronously.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the process with [`Termination::Failed`] and halts
    /// [`Simulation::run_until()`], which passes the error back to its caller unchanged.
    ///
    /// [`Simulation::run_until()`]: crate::Simulation::run_until
    fn resume(
        &mut self,
        wakeup: Wakeup<Item>,
        simulation_state: &mut State,
        context: &mut Context<'_, State, Item>,
    ) -> crate::Result<Step>;
}
