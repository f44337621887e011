mod event_holder;
pub(super) mod event_traits;

use super::{ProcessId, Wakeup};
use event_holder::EventHolder;
use event_traits::Event;

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::{Debug, Display, Formatter};

/// Identifies one scheduled event: its due time plus the creation sequence used to break ties.
///
/// Handles order the same way their events fire, so sorting a list of handles yields the firing order. A handle stays
/// valid until its event fires or is cancelled; after that, [`Simulation::cancel()`] reports it as unknown.
///
/// [`Simulation::cancel()`]: crate::Simulation::cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle {
    pub(super) due_time: OrderedFloat<f64>,
    pub(super) sequence: u64,
}

impl EventHandle {
    /// The virtual time at which the event is (or was) due.
    pub fn due_time(&self) -> f64 {
        self.due_time.0
    }

    /// The creation sequence of the event. Strictly increasing across every event a simulation ever schedules.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Display for EventHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "event #{} due at {}", self.sequence, self.due_time)
    }
}

/// What happens when an event fires.
pub(crate) enum Continuation<State, Item> {
    /// Resume a suspended process with the given wakeup.
    Resume(ProcessId, Wakeup<Item>),
    /// Run a one-shot callback event.
    Call(Box<dyn Event<State, Item>>),
}

impl<State, Item> Debug for Continuation<State, Item> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resume(process, wakeup) => write!(f, "Resume({process}, {})", wakeup.kind()),
            Self::Call(event) => write!(f, "Call({event:?})"),
        }
    }
}

/// Check that a delay can be added to the clock without moving it backward.
fn validate_delay(delay: f64) -> crate::Result<f64> {
    // written this way round so NaN is rejected too
    if !(delay >= 0.0) || delay.is_infinite() {
        return Err(crate::Error::InvalidDelay(delay));
    }
    Ok(delay)
}

/// Virtual clock plus the priority queue of scheduled events.
///
/// Events will execute in ascending order of due time, with ties broken by the order in which they were scheduled.
/// That tiebreaker is what makes runs reproducible: two events due at the same instant always fire in creation order,
/// regardless of how many other events were pushed or cancelled in between.
///
/// The clock only moves when an event is popped, and never backward: every scheduling method takes a nonnegative
/// delay relative to the current time rather than an absolute time.
pub(crate) struct EventQueue<State, Item> {
    events: BinaryHeap<Reverse<EventHolder<State, Item>>>,
    current_time: OrderedFloat<f64>,
    events_added: u64,
}

impl<State, Item> EventQueue<State, Item> {
    /// Construct a new [`EventQueue`] with no scheduled events and a clock initialized to the provided time.
    pub(crate) fn new(start_time: f64) -> Self {
        Self {
            events: BinaryHeap::default(),
            current_time: OrderedFloat(start_time),
            events_added: 0,
        }
    }

    /// Schedule the continuation after the specified delay.
    ///
    /// # Errors
    ///
    /// If `delay` is negative, NaN or infinite, returns an [`Error::InvalidDelay`] with no modifications to the queue.
    ///
    /// [`Error::InvalidDelay`]: crate::Error::InvalidDelay
    pub(crate) fn schedule(
        &mut self,
        delay: f64,
        continuation: Continuation<State, Item>,
    ) -> crate::Result<EventHandle> {
        let delay = validate_delay(delay)?;
        let due_time = OrderedFloat(self.current_time.0 + delay);
        Ok(self.push(due_time, continuation))
    }

    /// Schedule the continuation at the current time. Events previously scheduled for "now" will still execute before
    /// this one does.
    pub(crate) fn schedule_now(&mut self, continuation: Continuation<State, Item>) -> EventHandle {
        self.push(self.current_time, continuation)
    }

    fn push(&mut self, due_time: OrderedFloat<f64>, continuation: Continuation<State, Item>) -> EventHandle {
        let handle = EventHandle {
            due_time,
            sequence: self.increment_event_count(),
        };
        self.events.push(Reverse(EventHolder { handle, continuation }));
        handle
    }

    /// Helper function to make sure incrementing the internal count of added events occurs the same way across all
    /// scheduling methods.
    fn increment_event_count(&mut self) -> u64 {
        let count = self.events_added;
        self.events_added += 1;
        count
    }

    /// Pop the next event from the queue, advancing the clock to its due time.
    pub(crate) fn next(&mut self) -> Option<(EventHandle, Continuation<State, Item>)> {
        let Reverse(holder) = self.events.pop()?;
        debug_assert!(holder.handle.due_time >= self.current_time, "clock must never move backward");
        self.current_time = holder.handle.due_time;
        Some((holder.handle, holder.continuation))
    }

    /// Remove a scheduled event without firing it, handing back its continuation. Returns `None` if the event already
    /// fired or was withdrawn earlier.
    pub(crate) fn withdraw(&mut self, handle: EventHandle) -> Option<Continuation<State, Item>> {
        if handle.due_time < self.current_time || handle.sequence >= self.events_added {
            return None;
        }

        // ordering depends only on (due time, sequence), so rebuilding the heap keeps it intact
        let mut events = std::mem::take(&mut self.events).into_vec();
        let position = events.iter().position(|holder| holder.0.handle == handle);
        let withdrawn = position.map(|position| events.swap_remove(position).0.continuation);
        self.events = BinaryHeap::from(events);
        withdrawn
    }

    /// Put a withdrawn event back exactly where it was.
    pub(crate) fn reinsert(&mut self, handle: EventHandle, continuation: Continuation<State, Item>) {
        self.events.push(Reverse(EventHolder { handle, continuation }));
    }

    /// Drop every scheduled event, returning how many were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let discarded = self.events.len();
        self.events.clear();
        discarded
    }

    /// Move the clock forward to `time` without firing anything. Used once, when a run stops at its horizon.
    pub(crate) fn advance_to(&mut self, time: f64) {
        let time = OrderedFloat(time);
        if time > self.current_time {
            self.current_time = time;
        }
    }

    /// The due time of the next event, if any.
    pub(crate) fn next_due_time(&self) -> Option<f64> {
        self.events.peek().map(|holder| holder.0.handle.due_time.0)
    }

    /// The simulation's current clock time.
    pub(crate) fn current_time(&self) -> f64 {
        self.current_time.0
    }

    /// Number of events waiting to fire.
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Total number of events ever scheduled on this queue, fired or not.
    pub(crate) fn events_scheduled(&self) -> u64 {
        self.events_added
    }
}

impl<State, Item> Debug for EventQueue<State, Item> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("current_time", &self.current_time)
            .field("pending", &self.events.len())
            .field("events_added", &self.events_added)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Queue = EventQueue<(), ()>;

    fn resume(process: usize) -> Continuation<(), ()> {
        Continuation::Resume(ProcessId::new(process), Wakeup::TimedOut)
    }

    fn target(continuation: Continuation<(), ()>) -> usize {
        match continuation {
            Continuation::Resume(process, _) => process.index(),
            Continuation::Call(_) => panic!("expected a process resumption"),
        }
    }

    fn drain(queue: &mut Queue) -> Vec<(f64, usize)> {
        let mut fired = Vec::new();
        while let Some((handle, continuation)) = queue.next() {
            fired.push((handle.due_time(), target(continuation)));
        }
        fired
    }

    #[test]
    fn events_fire_in_time_order() {
        let mut queue = Queue::new(0.0);
        queue.schedule(30.0, resume(0)).unwrap();
        queue.schedule(10.0, resume(1)).unwrap();
        queue.schedule(20.0, resume(2)).unwrap();

        assert_eq!(vec![(10.0, 1), (20.0, 2), (30.0, 0)], drain(&mut queue));
        assert_eq!(30.0, queue.current_time());
    }

    #[test]
    fn ties_fire_in_creation_order() {
        let mut queue = Queue::new(0.0);
        queue.schedule(5.0, resume(0)).unwrap();
        queue.schedule(1.0, resume(1)).unwrap();
        queue.schedule(5.0, resume(2)).unwrap();
        queue.schedule(3.0, resume(3)).unwrap();
        queue.schedule(5.0, resume(4)).unwrap();
        queue.schedule(3.0, resume(5)).unwrap();

        let order: Vec<usize> = drain(&mut queue).into_iter().map(|(_, process)| process).collect();
        assert_eq!(vec![1, 3, 5, 0, 2, 4], order);
    }

    #[test]
    fn schedule_now_runs_after_earlier_same_time_events() {
        let mut queue = Queue::new(2.0);
        queue.schedule(0.0, resume(0)).unwrap();
        queue.schedule_now(resume(1));

        assert_eq!(vec![(2.0, 0), (2.0, 1)], drain(&mut queue));
    }

    #[test]
    fn invalid_delays_are_rejected_without_mutation() {
        let mut queue = Queue::new(0.0);
        assert_eq!(Err(crate::Error::InvalidDelay(-1.0)), queue.schedule(-1.0, resume(0)).map(|_| ()));
        assert!(queue.schedule(f64::NAN, resume(0)).is_err());
        assert!(queue.schedule(f64::INFINITY, resume(0)).is_err());
        assert_eq!(0, queue.len());
        assert_eq!(0, queue.events_scheduled());
    }

    #[test]
    fn withdrawn_events_never_fire() {
        let mut queue = Queue::new(0.0);
        queue.schedule(1.0, resume(0)).unwrap();
        let doomed = queue.schedule(2.0, resume(1)).unwrap();
        queue.schedule(3.0, resume(2)).unwrap();

        let withdrawn = queue.withdraw(doomed).expect("event should still be queued");
        assert_eq!(1, target(withdrawn));
        assert!(queue.withdraw(doomed).is_none(), "second withdrawal should fail");
        assert_eq!(vec![(1.0, 0), (3.0, 2)], drain(&mut queue));
    }

    #[test]
    fn fired_events_cannot_be_withdrawn() {
        let mut queue = Queue::new(0.0);
        let handle = queue.schedule(1.0, resume(0)).unwrap();
        queue.next();
        assert!(queue.withdraw(handle).is_none());
    }

    #[test]
    fn handles_sort_in_firing_order() {
        let mut queue = Queue::new(0.0);
        let mut handles = vec![
            queue.schedule(4.0, resume(0)).unwrap(),
            queue.schedule(1.0, resume(1)).unwrap(),
            queue.schedule(4.0, resume(2)).unwrap(),
        ];
        handles.sort();

        let fired: Vec<EventHandle> = std::iter::from_fn(|| queue.next().map(|(handle, _)| handle)).collect();
        assert_eq!(handles, fired);
    }
}
