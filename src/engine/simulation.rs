use super::core::{Core, Outcome};
use super::events::Continuation;
use super::{
    Context, Event, EventHandle, Process, ProcessId, ProcessStatus, Resource, ResourceId, Store, StoreId, Termination,
    Wakeup,
};
use crate::rate_limiter::{FixedWindowLimiter, LimiterId};
use crate::{Error, SimState};

use std::fmt::{Display, Formatter};
use tracing::{info, trace};

/// Owns the clock, the event queue, every process, resource, store and rate limiter, and the model state.
///
/// The defining struct for a queueing model in queuesim. The expected workflow is:
///
/// 1. Initialize a struct that implements [`SimState`] (or use `()`).
/// 2. Pass it and the start time to [`new()`].
/// 3. Create the resources and stores the model contends on, then spawn the initial processes or schedule initial
///    callback events.
/// 4. Call [`run_until()`] with the horizon. Handle any error it might return.
/// 5. Inspect [`state()`], the [`resource()`]/[`store()`] statistics, or the collected [`samples()`].
///
/// Runs are fully deterministic: the same model with the same seeded inputs produces the same sequence of fired
/// events and the same final state every time.
///
/// [`new()`]: Simulation::new
/// [`run_until()`]: Simulation::run_until
/// [`state()`]: Simulation::state
/// [`resource()`]: Simulation::resource
/// [`store()`]: Simulation::store
/// [`samples()`]: Simulation::samples
#[derive(Debug)]
pub struct Simulation<State, Item = ()>
where
    State: SimState,
{
    pub(crate) core: Core<State, Item>,
    /// The model state. Exclusive access is granted to each process step and callback event.
    state: State,
}

impl<State, Item> Simulation<State, Item>
where
    State: SimState,
{
    /// Initialize a simulation with the provided model state and a clock set to `start_time`.
    pub fn new(initial_state: State, start_time: f64) -> Self {
        Self {
            core: Core::new(start_time),
            state: initial_state,
        }
    }

    /// The current virtual time.
    pub fn now(&self) -> f64 {
        self.core.now()
    }

    /// Schedule a one-shot callback event after the specified delay.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDelay`] if `delay` is negative, NaN or infinite; [`Error::Finished`] once the horizon has been
    /// reached. The queue is left untouched in either case.
    pub fn schedule<EventType>(&mut self, delay: f64, event: EventType) -> crate::Result<EventHandle>
    where
        EventType: Event<State, Item> + 'static,
    {
        self.core.schedule(delay, Continuation::Call(Box::new(event)))
    }

    /// Withdraw a scheduled callback event so it never fires.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownHandle`] if the event already fired or was cancelled before. Wakeups the engine queued for
    /// processes cannot be cancelled this way; use [`abort()`] on the process instead.
    ///
    /// [`abort()`]: Simulation::abort
    pub fn cancel(&mut self, handle: EventHandle) -> crate::Result {
        self.core.cancel(handle)
    }

    /// Spawn a process. Its first step runs at the current time, after every event already due now.
    ///
    /// # Errors
    ///
    /// [`Error::Finished`] once the horizon has been reached.
    pub fn spawn<ProcessType>(&mut self, process: ProcessType) -> crate::Result<ProcessId>
    where
        ProcessType: Process<State, Item> + 'static,
    {
        self.core.spawn(Box::new(process))
    }

    /// Terminate a process from outside without running any more of its code.
    ///
    /// Whatever it was suspended on is withdrawn: a pending timeout or wakeup is removed from the queue, a resource or
    /// store wait leaves its line, and an await-all join is dropped. A store item already delivered to it but not yet
    /// received goes back to the head of its store. Every resource unit it holds is released, granting waiters in
    /// FIFO order.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownHandle`] if the process does not exist or has already terminated.
    pub fn abort(&mut self, process: ProcessId) -> crate::Result {
        self.core.abort(process)
    }

    /// Lifecycle state of a process, or `None` if no such process was ever spawned.
    pub fn status(&self, process: ProcessId) -> Option<ProcessStatus> {
        self.core.status(process)
    }

    /// Create a resource with `capacity` interchangeable units.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCapacity`] if `capacity` is zero.
    pub fn new_resource(&mut self, capacity: usize) -> crate::Result<ResourceId> {
        let id = ResourceId::new(self.core.resources.len());
        self.core.resources.push(Resource::new(id, capacity)?);
        Ok(id)
    }

    /// Create an empty, unbounded store.
    pub fn new_store(&mut self) -> StoreId {
        let id = StoreId::new(self.core.stores.len());
        self.core.stores.push(Store::new(id));
        id
    }

    /// Produce an item into a store from outside any process, e.g. to preload a queue before the run starts.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownHandle`] for a store that does not exist; [`Error::Finished`] once the horizon has been reached.
    pub fn put(&mut self, store: StoreId, item: Item) -> crate::Result {
        self.core.put(store, item)
    }

    /// Fire events in `(due time, sequence)` order until the queue empties, the model state reports completion, or
    /// the next event is due after `horizon`.
    ///
    /// Events due exactly at `horizon` still fire. In the last case the run is over for good: the remaining events are
    /// discarded, every live process is terminated with [`Termination::Horizon`], the clock is set to `horizon`, and
    /// further calls return immediately. Stopping for the other two reasons leaves everything in place, so a later call
    /// picks up where this one left off.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDelay`] if `horizon` is NaN or earlier than the current time. Errors returned by a process step
    /// or callback event are passed back unchanged. The process that failed is terminated with [`Termination::Failed`]
    /// and its resource units go to the next waiters; everything else stays as it was when the error occurred.
    pub fn run_until(&mut self, horizon: f64) -> crate::Result {
        if !(horizon >= self.now()) {
            return Err(Error::InvalidDelay(horizon - self.now()));
        }

        loop {
            if self.core.is_finished() || self.state.is_complete(self.now()) {
                break;
            }

            match self.core.queue.next_due_time() {
                None => break,
                Some(due_time) if due_time > horizon => {
                    self.core.finish(horizon);
                    break;
                },
                Some(_) => {
                    self.step()?;
                },
            }
        }

        info!(
            time = self.now(),
            events = self.core.queue.events_scheduled(),
            live = self.core.live_processes(),
            "run stopped"
        );
        Ok(())
    }

    /// Fire every event, with no horizon. Equivalent to `run_until(f64::INFINITY)`.
    ///
    /// # Errors
    ///
    /// See [`run_until()`](Simulation::run_until).
    pub fn run(&mut self) -> crate::Result {
        self.run_until(f64::INFINITY)
    }

    /// Fire exactly one event, ignoring [`SimState::is_complete()`]. Returns `false` if there was nothing to fire.
    ///
    /// # Errors
    ///
    /// Errors returned by the process step or callback event that ran.
    pub fn step(&mut self) -> crate::Result<bool> {
        if self.core.is_finished() {
            return Ok(false);
        }

        let Some((handle, continuation)) = self.core.queue.next() else {
            return Ok(false);
        };
        trace!(%handle, ?continuation, "firing event");

        match continuation {
            Continuation::Call(mut event) => {
                let mut context = Context::new(&mut self.core, None);
                event.execute(&mut self.state, &mut context)?;
            },
            Continuation::Resume(process, wakeup) => self.drive(process, wakeup)?,
        }
        Ok(true)
    }

    /// Resume a process and keep it running until it suspends on something that is not immediately available.
    fn drive(&mut self, process: ProcessId, mut wakeup: Wakeup<Item>) -> crate::Result {
        let Some(mut body) = self.core.begin(process)? else {
            trace!(%process, "dropping wakeup for terminated process");
            return Ok(());
        };

        loop {
            let step = {
                let mut context = Context::new(&mut self.core, Some(process));
                body.resume(wakeup, &mut self.state, &mut context)
            };

            match step.and_then(|step| self.core.suspend(process, step)) {
                Ok(Outcome::Continue(next)) => wakeup = next,
                Ok(Outcome::Suspended) => {
                    self.core.park(process, body);
                    return Ok(());
                },
                Ok(Outcome::Finished) => {
                    self.core.terminate(process, Termination::Finished);
                    return Ok(());
                },
                Err(error) => {
                    self.core.terminate(process, Termination::Failed);
                    return Err(error);
                },
            }
        }
    }

    /// Read-only view of a resource and its statistics.
    pub fn resource(&self, resource: ResourceId) -> Option<&Resource> {
        self.core.resources.get(resource.index())
    }

    /// Read-only view of a store and its statistics.
    pub fn store(&self, store: StoreId) -> Option<&Store<Item>> {
        self.core.stores.get(store.index())
    }

    /// Read-only view of a rate limiter and its statistics.
    pub fn limiter(&self, limiter: LimiterId) -> Option<&FixedWindowLimiter> {
        self.core.limiters.get(limiter.index())
    }

    /// Get a shared reference to the model state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Get an exclusive reference to the model state.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Consume the simulation, keeping only the model state.
    pub fn into_state(self) -> State {
        self.state
    }

    /// Whether the run has been cut off at its horizon.
    pub fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    /// Number of events waiting to fire.
    pub fn pending_events(&self) -> usize {
        self.core.queue.len()
    }

    /// Number of processes that have not terminated yet.
    pub fn live_processes(&self) -> usize {
        self.core.live_processes()
    }
}

impl<State, Item> Display for Simulation<State, Item>
where
    State: SimState,
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Simulation at time {}", self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OkEvent, Step};

    #[derive(Debug, Default)]
    struct Log {
        entries: Vec<(f64, &'static str)>,
        stop: bool,
    }

    impl SimState for Log {
        fn is_complete(&self, _: f64) -> bool {
            self.stop
        }
    }

    #[derive(Debug)]
    struct Mark(&'static str);

    impl OkEvent<Log, ()> for Mark {
        fn execute(&mut self, log: &mut Log, context: &mut Context<'_, Log, ()>) {
            log.entries.push((context.now(), self.0));
        }
    }

    #[derive(Debug)]
    struct Stop;

    impl OkEvent<Log, ()> for Stop {
        fn execute(&mut self, log: &mut Log, _: &mut Context<'_, Log, ()>) {
            log.stop = true;
        }
    }

    /// Sleeps for each delay in turn, logging every time it wakes up.
    #[derive(Debug)]
    struct Sleeper {
        name: &'static str,
        delays: Vec<f64>,
    }

    impl Process<Log, ()> for Sleeper {
        fn resume(&mut self, _: Wakeup<()>, log: &mut Log, context: &mut Context<'_, Log, ()>) -> crate::Result<Step> {
            log.entries.push((context.now(), self.name));
            if self.delays.is_empty() {
                return Ok(Step::Finish);
            }
            Ok(Step::Timeout(self.delays.remove(0)))
        }
    }

    #[test]
    fn callback_events_fire_in_time_order() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        sim.schedule(2.0, Mark("b")).unwrap();
        sim.schedule(1.0, Mark("a")).unwrap();
        sim.schedule(2.0, Mark("c")).unwrap();
        sim.run().unwrap();

        assert_eq!(vec![(1.0, "a"), (2.0, "b"), (2.0, "c")], sim.state().entries);
        assert!(!sim.is_finished(), "draining the queue should not cut the run off");
    }

    #[test]
    fn cancelled_events_never_fire() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        let doomed = sim.schedule(1.0, Mark("doomed")).unwrap();
        sim.schedule(2.0, Mark("kept")).unwrap();
        sim.cancel(doomed).unwrap();

        assert_eq!(
            Err(Error::UnknownHandle(crate::Handle::Event(doomed))),
            sim.cancel(doomed)
        );
        sim.run().unwrap();
        assert_eq!(vec![(2.0, "kept")], sim.state().entries);
    }

    #[test]
    fn processes_interleave_by_due_time() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        sim.spawn(Sleeper {
            name: "fast",
            delays: vec![1.0, 1.0],
        })
        .unwrap();
        sim.spawn(Sleeper {
            name: "slow",
            delays: vec![1.5],
        })
        .unwrap();
        sim.run().unwrap();

        assert_eq!(
            vec![
                (0.0, "fast"),
                (0.0, "slow"),
                (1.0, "fast"),
                (1.5, "slow"),
                (2.0, "fast"),
            ],
            sim.state().entries
        );
        assert_eq!(0, sim.live_processes());
    }

    #[test]
    fn horizon_discards_later_events_and_terminates_processes() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        let sleeper = sim
            .spawn(Sleeper {
                name: "sleeper",
                delays: vec![5.0, 5.0],
            })
            .unwrap();
        sim.schedule(10.0, Mark("at horizon")).unwrap();
        sim.run_until(7.0).unwrap();

        assert_eq!(vec![(0.0, "sleeper"), (5.0, "sleeper")], sim.state().entries);
        assert_eq!(7.0, sim.now());
        assert!(sim.is_finished());
        assert_eq!(0, sim.pending_events());
        assert_eq!(
            Some(ProcessStatus::Terminated(Termination::Horizon)),
            sim.status(sleeper)
        );

        assert_eq!(Err(Error::Finished), sim.schedule(1.0, Mark("late")).map(|_| ()));
        assert_eq!(Ok(()), sim.run_until(100.0));
        assert_eq!(7.0, sim.now());
    }

    #[test]
    fn events_due_exactly_at_the_horizon_fire() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        sim.schedule(5.0, Mark("edge")).unwrap();
        sim.run_until(5.0).unwrap();
        assert_eq!(vec![(5.0, "edge")], sim.state().entries);
    }

    #[test]
    fn completion_stops_with_events_still_queued() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        sim.schedule(1.0, Mark("a")).unwrap();
        sim.schedule(2.0, Stop).unwrap();
        sim.schedule(3.0, Mark("b")).unwrap();
        sim.run_until(10.0).unwrap();

        assert_eq!(vec![(1.0, "a")], sim.state().entries);
        assert_eq!(1, sim.pending_events());
        assert!(!sim.is_finished());
    }

    #[test]
    fn invalid_horizons_are_rejected() {
        let mut sim: Simulation<Log> = Simulation::new(Log::default(), 5.0);
        assert!(matches!(sim.run_until(f64::NAN), Err(Error::InvalidDelay(_))));
        assert_eq!(Err(Error::InvalidDelay(-1.0)), sim.run_until(4.0));
    }

    #[test]
    fn step_fires_one_event_at_a_time() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        sim.schedule(1.0, Mark("a")).unwrap();
        sim.schedule(2.0, Mark("b")).unwrap();

        assert_eq!(Ok(true), sim.step());
        assert_eq!(1.0, sim.now());
        assert_eq!(Ok(true), sim.step());
        assert_eq!(Ok(false), sim.step());
        assert_eq!(2, sim.state().entries.len());
    }

    #[derive(Debug)]
    struct Broken;

    impl Process<Log, ()> for Broken {
        fn resume(&mut self, _: Wakeup<()>, _: &mut Log, _: &mut Context<'_, Log, ()>) -> crate::Result<Step> {
            Err(Error::InvalidConfig(String::from("broken on purpose")))
        }
    }

    #[test]
    fn failing_steps_terminate_the_process_and_halt_the_run() {
        let mut sim = Simulation::new(Log::default(), 0.0);
        let broken = sim.spawn(Broken).unwrap();
        sim.schedule(1.0, Mark("after")).unwrap();

        assert_eq!(
            Err(Error::InvalidConfig(String::from("broken on purpose"))),
            sim.run()
        );
        assert_eq!(
            Some(ProcessStatus::Terminated(Termination::Failed)),
            sim.status(broken)
        );
        assert_eq!(1, sim.pending_events());
    }

    #[test]
    fn display_shows_the_clock() {
        let sim: Simulation<()> = Simulation::new((), 2.5);
        assert_eq!("Simulation at time 2.5", sim.to_string());
    }
}
