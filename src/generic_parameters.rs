/// The generic type used for a simulation's model state.
///
/// This type may include to-date summary statistics, collections of simulated entities, per-patient records, or
/// whatever else a queueing model needs to keep between events. Every event and process step receives exclusive
/// access to it, so model code never needs interior mutability or global metrics: each [`Simulation`] owns exactly one
/// instance, and it can be inspected after [`run_until()`] returns through [`Simulation::state()`].
///
/// This trait has only one method, which provides a way for [`run_until()`] to ask whether it should wrap up event
/// execution early. The default implementation always answers "no," and so a simulation running with the default
/// continues until its horizon is reached or its event queue empties out.
///
/// An implementation is provided for `()` for models that keep all of their observations in the engine's own
/// [`Snapshot`]s.
///
/// [`Simulation`]: crate::Simulation
/// [`Simulation::state()`]: crate::Simulation::state
/// [`run_until()`]: crate::Simulation::run_until
/// [`Snapshot`]: crate::metrics::Snapshot
pub trait SimState {
    /// Reports whether the simulation has run to completion. This method will be invoked in [`run_until()`] before
    /// popping each event off the queue: `true` indicates that the simulation is finished and that [`run_until()`]
    /// should return, whereas `false` means that it should continue with the next scheduled event.
    ///
    /// Stopping this way does not force-terminate anything; unlike reaching the horizon, a later call to
    /// [`run_until()`] picks up where the previous one left off.
    ///
    /// [`run_until()`]: crate::Simulation::run_until
    // expect that other implementations will make use of the
    // argument even though this one doesn't
    #[allow(unused_variables)]
    fn is_complete(&self, current_time: f64) -> bool {
        false
    }
}

impl SimState for () {}
