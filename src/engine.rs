//! The process-oriented scheduling engine: virtual clock, event queue, processes, resources and stores.

mod context;
mod core;
mod events;
mod process;
mod resource;
mod simulation;
mod store;

pub use context::Context;
pub use events::event_traits::{Event, OkEvent};
pub use events::EventHandle;
pub use process::{Process, ProcessId, ProcessStatus, Step, Termination, Wakeup};
pub use resource::{Resource, ResourceId, ResourceRequest, ResourceStats};
pub use simulation::Simulation;
pub use store::{Store, StoreId, StoreStats};

pub(crate) use self::core::Core;
