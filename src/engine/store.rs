use super::ProcessId;

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

/// Identifies a store created with [`Simulation::new_store()`].
///
/// [`Simulation::new_store()`]: crate::Simulation::new_store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoreId(usize);

impl StoreId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the store in creation order, starting at zero.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "store #{}", self.0)
    }
}

/// Counters collected by a [`Store`] over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Items produced into the store.
    pub puts: u64,
    /// Items handed to consumers, whether from the buffer or directly.
    pub gets: u64,
    /// Largest number of items ever buffered at once.
    pub max_depth: usize,
}

/// An unbounded FIFO hand-off buffer between producer and consumer processes.
///
/// Items are delivered in the order they were produced: never reordered, never dropped. A consumer that finds the
/// buffer empty waits in line, and the next `put` goes straight to the longest-waiting consumer instead of the buffer.
///
/// Invariant: if any consumer is waiting, the buffer is empty.
#[derive(Debug, Clone)]
pub struct Store<Item> {
    id: StoreId,
    buffer: VecDeque<Item>,
    pending_gets: VecDeque<ProcessId>,
    stats: StoreStats,
}

impl<Item> Store<Item> {
    pub(crate) fn new(id: StoreId) -> Self {
        Self {
            id,
            buffer: VecDeque::new(),
            pending_gets: VecDeque::new(),
            stats: StoreStats::default(),
        }
    }

    /// Produce an item. If a consumer is waiting, the item is handed to it and returned alongside it; otherwise the
    /// item is buffered.
    pub(crate) fn put(&mut self, item: Item) -> Option<(ProcessId, Item)> {
        self.stats.puts += 1;
        self.deliver_or_buffer(item, VecDeque::push_back)
    }

    /// Take the oldest buffered item, or register `consumer` as waiting if there is none.
    pub(crate) fn get(&mut self, consumer: ProcessId) -> Option<Item> {
        match self.buffer.pop_front() {
            Some(item) => {
                self.stats.gets += 1;
                Some(item)
            },
            None => {
                self.pending_gets.push_back(consumer);
                None
            },
        }
    }

    /// Return an item whose delivery was withdrawn. It goes back to the head of the line, ahead of anything produced
    /// after it.
    pub(crate) fn restore(&mut self, item: Item) -> Option<(ProcessId, Item)> {
        self.stats.gets = self.stats.gets.saturating_sub(1);
        self.deliver_or_buffer(item, VecDeque::push_front)
    }

    /// Remove `consumer` from the waiting consumers. Returns whether it was waiting.
    pub(crate) fn withdraw(&mut self, consumer: ProcessId) -> bool {
        let before = self.pending_gets.len();
        self.pending_gets.retain(|waiting| *waiting != consumer);
        before != self.pending_gets.len()
    }

    fn deliver_or_buffer(
        &mut self,
        item: Item,
        enqueue: fn(&mut VecDeque<Item>, Item),
    ) -> Option<(ProcessId, Item)> {
        if let Some(consumer) = self.pending_gets.pop_front() {
            debug_assert!(self.buffer.is_empty(), "consumers waiting while items are buffered");
            self.stats.gets += 1;
            return Some((consumer, item));
        }

        enqueue(&mut self.buffer, item);
        self.stats.max_depth = self.stats.max_depth.max(self.buffer.len());
        None
    }

    /// Identifier of this store.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of consumers waiting for an item.
    pub fn waiting_consumers(&self) -> usize {
        self.pending_gets.len()
    }

    /// Buffered items, oldest first.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.buffer.iter()
    }

    /// Counters collected so far.
    pub fn stats(&self) -> StoreStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store<u32> {
        Store::new(StoreId::new(0))
    }

    #[test]
    fn items_come_out_in_put_order() {
        let mut queue = store();
        for item in 0..5 {
            assert_eq!(None, queue.put(item));
        }

        let taken: Vec<u32> = (0..5).map(|_| queue.get(ProcessId::new(0)).unwrap()).collect();
        assert_eq!(vec![0, 1, 2, 3, 4], taken);
        assert_eq!(5, queue.stats().max_depth);
    }

    #[test]
    fn waiting_consumer_bypasses_the_buffer() {
        let mut queue = store();
        assert_eq!(None, queue.get(ProcessId::new(7)));
        assert_eq!(None, queue.get(ProcessId::new(8)));

        assert_eq!(Some((ProcessId::new(7), 10)), queue.put(10));
        assert!(queue.is_empty(), "item should not have been buffered");
        assert_eq!(1, queue.waiting_consumers());
        assert_eq!(Some((ProcessId::new(8), 11)), queue.put(11));
        assert_eq!(None, queue.put(12));
        assert_eq!(1, queue.len());
    }

    #[test]
    fn restored_items_jump_the_line() {
        let mut queue = store();
        queue.put(2);
        queue.put(3);
        assert_eq!(None, queue.restore(1));
        assert_eq!(vec![1, 2, 3], queue.items().copied().collect::<Vec<_>>());
    }

    #[test]
    fn restored_items_go_to_the_next_waiting_consumer() {
        let mut queue = store();
        queue.get(ProcessId::new(4));
        assert_eq!(Some((ProcessId::new(4), 9)), queue.restore(9));
        assert_eq!(0, queue.waiting_consumers());
    }

    #[test]
    fn withdrawn_consumers_no_longer_receive() {
        let mut queue = store();
        queue.get(ProcessId::new(1));
        queue.get(ProcessId::new(2));
        assert!(queue.withdraw(ProcessId::new(1)));
        assert_eq!(Some((ProcessId::new(2), 5)), queue.put(5));
    }
}
