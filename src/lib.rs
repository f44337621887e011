//! # Overview
//!
//! queuesim is a process-oriented discrete-event simulation engine for queueing models: nurses seeing patients,
//! registration desks, workers draining a backlog, API gateways enforcing a rate limit. It provides a virtual clock and
//! event queue, cooperative processes that suspend and resume in virtual time, and the shared structures those
//! processes contend on:
//!
//! * A [`Process`] is an explicit state machine. Each time the engine resumes it with a [`Wakeup`], it does its work
//!   and answers with the [`Step`] it wants to wait on next: a timeout, a unit of a [`Resource`], an item from a
//!   [`Store`], or the termination of other processes. Requests that can be satisfied straight away never suspend.
//! * A [`Resource`] is a pool of interchangeable units with a strict FIFO wait line. A released unit is granted to the
//!   next waiter within the same step, so same-time releases grant in the order they happened.
//! * A [`Store`] is an unbounded FIFO hand-off buffer between producer and consumer processes.
//! * A [`FixedWindowLimiter`] is a built-in process that drains a store while admitting at most a fixed number of
//!   items per aligned window of virtual time.
//!
//! Everything runs on a single thread of control, and exactly one process step or callback [`Event`] executes at a
//! time with exclusive access to the model state, so models never need locks or interior mutability. Events due at the
//! same instant fire in the order they were created, which makes every run reproducible: the same model fed the same
//! seeded random numbers produces the same result every time.
//!
//! # Features
//!
//! queuesim offers one feature, `serde`, which derives `Serialize` and `Deserialize` for [`config::ModelConfig`] and
//! the handle types, and `Serialize` for [`metrics::Snapshot`]. It is disabled by default.
//!
//! # Logging
//!
//! The engine reports through the [`tracing`] facade: `trace` for every fired event, `debug` for grants, throttles,
//! aborts and the horizon cut-off, `warn` for processes that finish while still holding resource units. No subscriber
//! is installed; pick one in the binary running the model.
//!
//! [`tracing`]: https://docs.rs/tracing/0.1
//! [`FixedWindowLimiter`]: rate_limiter::FixedWindowLimiter

pub mod config;
pub mod engine;
mod error;
mod generic_parameters;
pub mod metrics;
pub mod rate_limiter;

pub use engine::{
    Context, Event, EventHandle, OkEvent, Process, ProcessId, ProcessStatus, Resource, ResourceId, ResourceStats,
    Simulation, Step, Store, StoreId, StoreStats, Termination, Wakeup,
};
pub use error::{Error, Handle, Result};
pub use generic_parameters::SimState;
