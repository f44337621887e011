//! Fixed-window rate limiting on top of a [`Store`].
//!
//! A fixed-window limiter consumes items from a source store and admits at most `max_threshold` of them per window of
//! virtual time. Windows are aligned to multiples of the window size, so with a 60 second window the boundaries fall
//! at 0, 60, 120, … regardless of when the first item shows up. Once a window is full, the limiter holds on to the
//! next item and sleeps until the window ends; that item is then the first one admitted in the new window.
//!
//! [`Store`]: crate::Store

use crate::engine::{Context, Process, ProcessId, Step, StoreId, Wakeup};
use crate::{Error, Handle, SimState, Simulation};

use std::fmt::{Debug, Display, Formatter};
use tracing::debug;

/// Identifies a rate limiter created with [`Simulation::new_rate_limiter()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimiterId(usize);

impl LimiterId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the limiter in creation order, starting at zero.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for LimiterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "limiter #{}", self.0)
    }
}

/// The window a limiter is currently counting admissions in: `[start, end)`, with `end = start + size`.
///
/// Windows are numbered from zero at time zero and their bounds are always derived from that number, so consecutive
/// windows share their boundary exactly no matter how much rounding the clock has accumulated.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RateLimiterWindow {
    size: f64,
    index: i64,
    count: usize,
}

impl RateLimiterWindow {
    /// The empty window of the given size that contains `now`.
    pub fn new(size: f64, now: f64) -> Self {
        Self {
            size,
            index: Self::index_at(size, now),
            count: 0,
        }
    }

    fn index_at(size: f64, now: f64) -> i64 {
        (now / size).floor() as i64
    }

    /// Start and end of the window of the given size that contains `now`.
    pub fn bounds(size: f64, now: f64) -> (f64, f64) {
        let index = Self::index_at(size, now);
        (index as f64 * size, (index + 1) as f64 * size)
    }

    /// Move on to the window containing `now` if the current one has ended, emptying it. An instant equal to `end`
    /// already belongs to the next window. Returns whether the window moved.
    pub fn roll(&mut self, now: f64) -> bool {
        if now < self.end() {
            return false;
        }
        self.advance(now);
        true
    }

    /// Move on to the next window, or further if `now` lies beyond it, emptying it.
    pub fn advance(&mut self, now: f64) {
        self.index = Self::index_at(self.size, now).max(self.index + 1);
        self.count = 0;
    }

    /// Forget the admissions counted so far without moving the window.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Length of every window.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Inclusive start of the current window.
    pub fn start(&self) -> f64 {
        self.index as f64 * self.size
    }

    /// Exclusive end of the current window.
    pub fn end(&self) -> f64 {
        (self.index + 1) as f64 * self.size
    }

    /// Items admitted in the current window so far.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Counters and throttle samples collected by a [`FixedWindowLimiter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimiterStats {
    /// Items admitted so far.
    pub processed: u64,
    /// How long the limiter slept each time a window was full, in order.
    pub throttle_waits: Vec<f64>,
    /// Most items ever admitted in a single window. Never exceeds the threshold.
    pub max_in_window: usize,
}

impl LimiterStats {
    /// Average throttle wait, or `None` if the limiter never had to wait.
    pub fn mean_throttle_wait(&self) -> Option<f64> {
        if self.throttle_waits.is_empty() {
            None
        } else {
            Some(self.throttle_waits.iter().sum::<f64>() / self.throttle_waits.len() as f64)
        }
    }
}

/// Book-keeping for one fixed-window limiter. The consuming itself is done by a built-in process.
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    id: LimiterId,
    window: RateLimiterWindow,
    max_threshold: usize,
    source: StoreId,
    sink: Option<StoreId>,
    process: ProcessId,
    stats: LimiterStats,
}

impl FixedWindowLimiter {
    fn admit(&mut self) {
        self.window.count += 1;
        self.stats.processed += 1;
        self.stats.max_in_window = self.stats.max_in_window.max(self.window.count);
        debug_assert!(self.window.count <= self.max_threshold, "window over threshold");
    }

    /// Identifier of this limiter.
    pub fn id(&self) -> LimiterId {
        self.id
    }

    /// The window currently being counted.
    pub fn window(&self) -> &RateLimiterWindow {
        &self.window
    }

    /// Most items admitted per window.
    pub fn max_threshold(&self) -> usize {
        self.max_threshold
    }

    /// The store items are consumed from.
    pub fn source(&self) -> StoreId {
        self.source
    }

    /// The store admitted items are forwarded to, if any.
    pub fn sink(&self) -> Option<StoreId> {
        self.sink
    }

    /// The built-in process doing the consuming. Aborting it stops the limiter.
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// Counters and throttle samples collected so far.
    pub fn stats(&self) -> &LimiterStats {
        &self.stats
    }
}

/// What [`Simulation::new_rate_limiter()`] hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LimiterHandle {
    /// For looking up the limiter's window and statistics.
    pub limiter: LimiterId,
    /// The built-in process consuming the source store.
    pub process: ProcessId,
}

struct RateLimiterProcess<Item> {
    id: LimiterId,
    source: StoreId,
    /// Item held back while waiting out a full window.
    deferred: Option<Item>,
}

impl<Item> Debug for RateLimiterProcess<Item> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterProcess")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("holding_item", &self.deferred.is_some())
            .finish()
    }
}

impl<Item> RateLimiterProcess<Item> {
    /// Admit an item or hold it back until the window ends. `throttled` marks an item coming back from such a wait,
    /// which always belongs to a fresh window even if the clock landed a rounding error short of the boundary.
    fn offer<State>(
        &mut self,
        item: Item,
        throttled: bool,
        context: &mut Context<'_, State, Item>,
    ) -> crate::Result<Step> {
        let now = context.now();
        let limiter = context.limiter_mut(self.id)?;
        if throttled {
            limiter.window.advance(now);
        } else {
            limiter.window.roll(now);
        }

        if limiter.window.count + 1 > limiter.max_threshold {
            let wait = limiter.window.end() - now;
            limiter.window.reset();
            limiter.stats.throttle_waits.push(wait);
            debug!(limiter = %self.id, time = now, wait, "window full, throttling");
            self.deferred = Some(item);
            return Ok(Step::Timeout(wait));
        }

        limiter.admit();
        let sink = limiter.sink;
        if let Some(sink) = sink {
            context.put(sink, item)?;
        }
        Ok(Step::Get(self.source))
    }
}

impl<State, Item> Process<State, Item> for RateLimiterProcess<Item> {
    fn resume(
        &mut self,
        wakeup: Wakeup<Item>,
        _: &mut State,
        context: &mut Context<'_, State, Item>,
    ) -> crate::Result<Step> {
        match wakeup {
            Wakeup::Received(_, item) => self.offer(item, false, context),
            Wakeup::TimedOut => match self.deferred.take() {
                Some(item) => self.offer(item, true, context),
                None => Ok(Step::Get(self.source)),
            },
            _ => Ok(Step::Get(self.source)),
        }
    }
}

impl<State, Item> Simulation<State, Item>
where
    State: SimState,
    Item: 'static,
{
    /// Start a fixed-window limiter that consumes `source`, admitting at most `max_threshold` items per
    /// `window_size` of virtual time. Admitted items are simply consumed; see [`new_rate_limiter_into()`] to pass them
    /// on.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCapacity`] if `window_size` is not a positive finite number or `max_threshold` is zero;
    /// [`Error::UnknownHandle`] if `source` does not exist; [`Error::Finished`] once the horizon has been reached.
    ///
    /// [`new_rate_limiter_into()`]: Simulation::new_rate_limiter_into
    pub fn new_rate_limiter(
        &mut self,
        window_size: f64,
        max_threshold: usize,
        source: StoreId,
    ) -> crate::Result<LimiterHandle> {
        self.build_limiter(window_size, max_threshold, source, None)
    }

    /// Like [`new_rate_limiter()`], but every admitted item is put into `sink` at the moment it is admitted.
    ///
    /// # Errors
    ///
    /// As [`new_rate_limiter()`], plus [`Error::UnknownHandle`] if `sink` does not exist.
    ///
    /// [`new_rate_limiter()`]: Simulation::new_rate_limiter
    pub fn new_rate_limiter_into(
        &mut self,
        window_size: f64,
        max_threshold: usize,
        source: StoreId,
        sink: StoreId,
    ) -> crate::Result<LimiterHandle> {
        self.build_limiter(window_size, max_threshold, source, Some(sink))
    }

    fn build_limiter(
        &mut self,
        window_size: f64,
        max_threshold: usize,
        source: StoreId,
        sink: Option<StoreId>,
    ) -> crate::Result<LimiterHandle> {
        let id = LimiterId::new(self.core.limiters.len());
        if !(window_size > 0.0) || window_size.is_infinite() {
            return Err(Error::InvalidCapacity(format!(
                "{id} needs a positive, finite window size, got {window_size}"
            )));
        }
        if max_threshold == 0 {
            return Err(Error::InvalidCapacity(format!("{id} needs a threshold of at least one item")));
        }
        for store in std::iter::once(source).chain(sink) {
            if self.store(store).is_none() {
                return Err(Error::UnknownHandle(Handle::Store(store)));
            }
        }

        let process = self.spawn(RateLimiterProcess {
            id,
            source,
            deferred: None,
        })?;
        self.core.limiters.push(FixedWindowLimiter {
            id,
            window: RateLimiterWindow::new(window_size, self.now()),
            max_threshold,
            source,
            sink,
            process,
            stats: LimiterStats::default(),
        });
        debug!(limiter = %id, %process, window_size, max_threshold, "started rate limiter");

        Ok(LimiterHandle { limiter: id, process })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;

    /// Records the time each item comes out of a store.
    #[derive(Debug)]
    struct Recorder(StoreId);

    impl Process<Vec<(f64, u32)>, u32> for Recorder {
        fn resume(
            &mut self,
            wakeup: Wakeup<u32>,
            seen: &mut Vec<(f64, u32)>,
            context: &mut Context<'_, Vec<(f64, u32)>, u32>,
        ) -> crate::Result<Step> {
            if let Some(item) = wakeup.into_item() {
                seen.push((context.now(), item));
            }
            Ok(Step::Get(self.0))
        }
    }

    impl SimState for Vec<(f64, u32)> {}

    #[derive(Debug)]
    struct Feed {
        store: StoreId,
        items: Vec<u32>,
    }

    impl Event<Vec<(f64, u32)>, u32> for Feed {
        fn execute(
            &mut self,
            _: &mut Vec<(f64, u32)>,
            context: &mut Context<'_, Vec<(f64, u32)>, u32>,
        ) -> crate::Result {
            for item in self.items.drain(..) {
                context.put(self.store, item)?;
            }
            Ok(())
        }
    }

    fn pipeline(window_size: f64, max_threshold: usize) -> (Simulation<Vec<(f64, u32)>, u32>, StoreId, LimiterId) {
        let mut sim = Simulation::new(Vec::new(), 0.0);
        let source = sim.new_store();
        let sink = sim.new_store();
        let handle = sim
            .new_rate_limiter_into(window_size, max_threshold, source, sink)
            .unwrap();
        sim.spawn(Recorder(sink)).unwrap();
        (sim, source, handle.limiter)
    }

    #[test]
    fn window_bounds_are_aligned_to_the_size() {
        assert_eq!((60.0, 120.0), RateLimiterWindow::bounds(60.0, 90.0));
        assert_eq!((60.0, 120.0), RateLimiterWindow::bounds(60.0, 60.0));
        assert_eq!((0.0, 0.5), RateLimiterWindow::bounds(0.5, 0.25));
        assert_eq!((-60.0, 0.0), RateLimiterWindow::bounds(60.0, -5.0));
    }

    #[test]
    fn advance_always_makes_progress() {
        let mut window = RateLimiterWindow::new(0.1, 0.0);
        window.count = 1;
        // just short of the boundary, as a clock can land after summing rounded delays
        window.advance(0.1 - 1e-12);
        assert_eq!((0.1, 0.2, 0), (window.start(), window.end(), window.count()));
        window.advance(0.75);
        assert_eq!(7, (window.start() / 0.1).round() as i64);
    }

    #[test]
    fn roll_moves_on_only_once_the_window_has_ended() {
        let mut window = RateLimiterWindow::new(10.0, 3.0);
        window.count = 2;
        assert!(!window.roll(9.99));
        assert_eq!(2, window.count());
        assert!(window.roll(10.0));
        assert_eq!((10.0, 20.0, 0), (window.start(), window.end(), window.count()));
        assert!(window.roll(45.0));
        assert_eq!(40.0, window.start());
    }

    #[test]
    fn fourth_item_waits_for_the_next_window() {
        let (mut sim, source, limiter) = pipeline(60.0, 3);
        for item in 0..4 {
            sim.put(source, item).unwrap();
        }
        sim.run().unwrap();

        assert_eq!(&vec![(0.0, 0), (0.0, 1), (0.0, 2), (60.0, 3)], sim.state());
        let stats = sim.limiter(limiter).unwrap().stats();
        assert_eq!(vec![60.0], stats.throttle_waits);
        assert_eq!(4, stats.processed);
        assert_eq!(3, stats.max_in_window);
    }

    #[test]
    fn items_at_the_window_end_start_a_new_window() {
        let (mut sim, source, limiter) = pipeline(10.0, 1);
        sim.schedule(0.0, Feed { store: source, items: vec![0] }).unwrap();
        sim.schedule(10.0, Feed { store: source, items: vec![1, 2] }).unwrap();
        sim.run().unwrap();

        assert_eq!(&vec![(0.0, 0), (10.0, 1), (20.0, 2)], sim.state());
        let limiter = sim.limiter(limiter).unwrap();
        assert_eq!(vec![10.0], limiter.stats().throttle_waits);
        assert_eq!((20.0, 30.0), (limiter.window().start(), limiter.window().end()));
    }

    #[test]
    fn throttle_wait_runs_to_the_aligned_window_end() {
        let mut sim = Simulation::new(Vec::new(), 45.0);
        let source = sim.new_store();
        let sink = sim.new_store();
        let handle = sim.new_rate_limiter_into(60.0, 1, source, sink).unwrap();
        sim.spawn(Recorder(sink)).unwrap();
        sim.put(source, 7).unwrap();
        sim.put(source, 8).unwrap();
        sim.run().unwrap();

        assert_eq!(&vec![(45.0, 7), (60.0, 8)], sim.state());
        assert_eq!(vec![15.0], sim.limiter(handle.limiter).unwrap().stats().throttle_waits);
    }

    #[test]
    fn invalid_limiters_are_rejected() {
        let mut sim: Simulation<Vec<(f64, u32)>, u32> = Simulation::new(Vec::new(), 0.0);
        let source = sim.new_store();

        for window_size in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                sim.new_rate_limiter(window_size, 3, source),
                Err(Error::InvalidCapacity(_))
            ));
        }
        assert!(matches!(sim.new_rate_limiter(60.0, 0, source), Err(Error::InvalidCapacity(_))));
        assert_eq!(
            Err(Error::UnknownHandle(Handle::Store(StoreId::new(9)))),
            sim.new_rate_limiter_into(60.0, 3, source, StoreId::new(9))
        );
        assert_eq!(0, sim.live_processes(), "no limiter process should have been spawned");
    }
}
