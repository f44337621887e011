use crate::engine::Context;
use std::fmt::Debug;

/// A one-shot callback that runs at a scheduled point in virtual time.
///
/// Callback events complement processes: where a [`Process`] suspends and resumes many times, an [`Event`] runs exactly
/// once and is then dropped. They are the right tool for model-level stimuli such as "open the waiting room at t = 480"
/// or "inject a burst of requests," and are scheduled through [`Simulation::schedule()`] or [`Context::schedule()`].
///
/// Requiring implementors to be [`Debug`] lets the engine name each callback in its `trace` output.
///
/// [`Process`]: crate::Process
/// [`Simulation::schedule()`]: crate::Simulation::schedule
pub trait Event<State, Item>: Debug {
    /// Update the simulation according to the specific type of event. Exclusive access is provided to the model state,
    /// and the [`Context`] allows spawning processes, putting items into stores, and scheduling further events.
    ///
    /// Callback events do not run on behalf of any process, so [`Context::release()`] always fails with
    /// [`Error::NotHeld`] from inside one.
    ///
    /// # Errors
    ///
    /// Any error returned here halts [`Simulation::run_until()`] and is passed back to its caller unchanged. Wrap
    /// client-side failures in [`Error::BadExecution`] to shut a run down cleanly instead of panicking somewhere deep
    /// in the event queue.
    ///
    /// [`Simulation::run_until()`]: crate::Simulation::run_until
    /// [`Error::NotHeld`]: crate::Error::NotHeld
    /// [`Error::BadExecution`]: crate::Error::BadExecution
    fn execute(&mut self, simulation_state: &mut State, context: &mut Context<'_, State, Item>) -> crate::Result;
}

/// An [`Event`] that is guaranteed not to return an [`Error`] on execution.
///
/// The [`execute()`] method on this trait differs from [`Event::execute()`] only by omitting the return type. An
/// implementation of [`Event`] is provided for all implementors of this trait which simply invokes
/// [`OkEvent::execute()`] then returns `Ok(())`.
///
/// [`execute()`]: OkEvent::execute
/// [`Event::execute()`]: Event::execute
/// [`OkEvent::execute()`]: OkEvent::execute
/// [`Error`]: crate::Error
pub trait OkEvent<State, Item>: Debug {
    /// Update the simulation according to the specific type of event. See [`Event::execute()`].
    fn execute(&mut self, simulation_state: &mut State, context: &mut Context<'_, State, Item>);
}

impl<State, Item, OkEventType> Event<State, Item> for OkEventType
where
    OkEventType: OkEvent<State, Item>,
{
    fn execute(&mut self, simulation_state: &mut State, context: &mut Context<'_, State, Item>) -> crate::Result {
        OkEvent::execute(self, simulation_state, context);
        Ok(())
    }
}
