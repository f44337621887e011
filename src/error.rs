use crate::engine::{EventHandle, ProcessId, ResourceId, StoreId};
use crate::rate_limiter::LimiterId;

use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Identifies the kind of handle that failed to resolve in an [`Error::UnknownHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    /// A queued event, e.g. one that has already fired or been cancelled.
    Event(EventHandle),
    /// A process that does not exist or has already terminated.
    Process(ProcessId),
    /// A resource that was never created in this simulation.
    Resource(ResourceId),
    /// A store that was never created in this simulation.
    Store(StoreId),
    /// A rate limiter that was never created in this simulation.
    Limiter(LimiterId),
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(handle) => write!(f, "{handle}"),
            Self::Process(id) => write!(f, "{id}"),
            Self::Resource(id) => write!(f, "{id}"),
            Self::Store(id) => write!(f, "{id}"),
            Self::Limiter(id) => write!(f, "{id}"),
        }
    }
}

/// Errors that may be encountered while building or executing a simulation.
///
/// All of them are local, synchronous failures surfaced to the calling model code. The engine never retries, and a
/// failed operation leaves resources, stores and the event queue exactly as they were.
///
/// The [`BadExecution`] variant originates from client code, providing a wrapper that can pass through
/// [`Simulation::run_until()`] in a type-safe manner. Invoking [`std::error::Error::source()`] on this variant will
/// acquire a shared reference to the wrapped error for handling on the client side.
///
/// [`Simulation::run_until()`]: crate::Simulation::run_until
/// [`BadExecution`]: Error::BadExecution
#[derive(Debug, Error)]
pub enum Error {
    /// A timeout or horizon was negative, NaN, or otherwise would have moved the clock backward.
    #[error("invalid delay {0}: delays must be finite and nonnegative")]
    InvalidDelay(f64),
    /// A resource capacity, window size or window threshold was not strictly positive.
    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),
    /// A process released a resource unit it does not hold.
    #[error("release of {0} without a held unit")]
    NotHeld(ResourceId),
    /// A handle did not resolve to a live entity.
    #[error("unknown or expired handle: {0}")]
    UnknownHandle(Handle),
    /// The process is executing right now and so cannot be aborted; return [`Step::Finish`] instead.
    ///
    /// [`Step::Finish`]: crate::Step::Finish
    #[error("{0} is currently running and cannot be aborted")]
    ProcessRunning(ProcessId),
    /// The simulation already stopped at its horizon and accepts no further work.
    #[error("simulation has already reached its horizon")]
    Finished,
    /// A model configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A client-generated error was encountered while executing an event or process step. Call [`source()`] or
    /// unpack this value to handle it directly.
    ///
    /// [`source()`]: std::error::Error::source
    #[error("error while executing event: {0}")]
    BadExecution(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::InvalidDelay(d1), Error::InvalidDelay(d2)) => d1.to_bits() == d2.to_bits(),
            (Error::InvalidCapacity(m1), Error::InvalidCapacity(m2)) => m1 == m2,
            (Error::NotHeld(r1), Error::NotHeld(r2)) => r1 == r2,
            (Error::UnknownHandle(h1), Error::UnknownHandle(h2)) => h1 == h2,
            (Error::ProcessRunning(p1), Error::ProcessRunning(p2)) => p1 == p2,
            (Error::Finished, Error::Finished) => true,
            (Error::InvalidConfig(m1), Error::InvalidConfig(m2)) => m1 == m2,
            (Error::BadExecution(e1), Error::BadExecution(e2)) => {
                let e1: *const dyn std::error::Error = e1.as_ref();
                let e2: *const dyn std::error::Error = e2.as_ref();
                std::ptr::eq(e1, e2)
            },
            _ => false,
        }
    }
}

/// [`std::result::Result`]`<T, `[`queuesim::Error`]`>`, defaulting to `T = ()`.
///
/// A type alias that simplifies the signatures of various functions in queuesim.
///
/// [`queuesim::Error`]: Error
pub type Result<T = ()> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("model broke")]
    struct ModelError;

    #[test]
    fn bad_execution_exposes_source() {
        let error = Error::BadExecution(Box::new(ModelError));
        let source = std::error::Error::source(&error).expect("source should be present");
        assert_eq!("model broke", source.to_string());
        assert_eq!("error while executing event: model broke", error.to_string());
    }

    #[test]
    fn nan_delays_compare_equal() {
        assert_eq!(Error::InvalidDelay(f64::NAN), Error::InvalidDelay(f64::NAN));
        assert_ne!(Error::InvalidDelay(-1.0), Error::InvalidDelay(-2.0));
    }

    #[test]
    fn handle_display_names_the_entity() {
        let error = Error::UnknownHandle(Handle::Store(StoreId::new(3)));
        assert_eq!("unknown or expired handle: store #3", error.to_string());
    }
}
