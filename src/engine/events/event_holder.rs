use super::{Continuation, EventHandle};
use std::cmp::Ordering;

/// Helper struct for the event queue. This struct holds the continuation to run alongside the data necessary to sort
/// events within the priority queue, namely the due time and the event's creation sequence, both packed into its
/// [`EventHandle`].
///
/// The implementation of [`Ord`] on this struct cares first about the due time, comparing the creation sequences only
/// to break ties. Sequences are unique within a queue, so no two holders ever compare equal.
#[derive(Debug)]
pub(super) struct EventHolder<State, Item> {
    pub handle: EventHandle,
    pub continuation: Continuation<State, Item>,
}

impl<State, Item> PartialEq<Self> for EventHolder<State, Item> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<State, Item> Eq for EventHolder<State, Item> {}

impl<State, Item> PartialOrd<Self> for EventHolder<State, Item> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<State, Item> Ord for EventHolder<State, Item> {
    fn cmp(&self, other: &Self) -> Ordering {
        let comparison = self.handle.due_time.cmp(&other.handle.due_time);
        match comparison {
            Ordering::Equal => self.handle.sequence.cmp(&other.handle.sequence),
            _ => comparison,
        }
    }
}
