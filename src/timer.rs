//! Single timer: monotonic next-fire time, optional repeat interval, and a
//! process-unique stable ID (`original_source/time/Timer.{h,cpp}`).

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Stable, process-unique timer identifier. `0` is reserved as "invalid"
/// (spec.md §9 "Global mutable state"); the counter is seeded at 1.
pub type TimerId = u64;

pub const INVALID_TIMER_ID: TimerId = 0;

static TIMERS_CREATED: AtomicU64 = AtomicU64::new(1);

/// Allocates the next process-unique timer ID. Callable from any thread —
/// this is the one piece of timer state that is not loop-thread-confined
/// (spec.md §9 "Global mutable state").
#[must_use]
pub fn allocate_id() -> TimerId {
    TIMERS_CREATED.fetch_add(1, Ordering::Relaxed)
}

/// Timers are constructed on the loop thread but their IDs must be
/// allocatable from any thread (see [`allocate_id`]), so the callback itself
/// is required to be `Send` even though it only ever runs on the loop
/// thread — this matches the `Task` bound used for cross-thread submission.
pub type TimerCallback = Box<dyn FnMut() + Send>;

/// A one-shot or periodic timer. Re-arms to `fire_time + interval` after
/// firing when `interval` is non-zero; IDs are never reused.
pub struct Timer {
    callback: RefCell<TimerCallback>,
    when: Cell<Instant>,
    interval: Duration,
    id: TimerId,
    /// Insertion sequence, used only to break ties between timers sharing
    /// the same `when` (spec.md §4.3 "ties broken by insertion order").
    seq: u64,
}

impl Timer {
    /// Builds a timer with a freshly-allocated ID; intended for use on the
    /// loop thread, where `when`/`interval`/`callback` are already local.
    #[must_use]
    pub fn new(callback: TimerCallback, when: Instant, interval: Duration, seq: u64) -> Self {
        Timer::with_id(allocate_id(), callback, when, interval, seq)
    }

    /// Builds a timer with a caller-supplied ID, for the cross-thread
    /// `add_timer` path where the ID is allocated up front (so it can be
    /// returned immediately) and the `Timer` itself is constructed later,
    /// on the loop thread.
    #[must_use]
    pub fn with_id(
        id: TimerId,
        callback: TimerCallback,
        when: Instant,
        interval: Duration,
        seq: u64,
    ) -> Self {
        Timer {
            callback: RefCell::new(callback),
            when: Cell::new(when),
            interval,
            id,
            seq,
        }
    }

    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    #[must_use]
    pub fn when(&self) -> Instant {
        self.when.get()
    }

    #[must_use]
    pub fn is_repeat(&self) -> bool {
        self.interval > Duration::ZERO
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Invokes the callback exactly once.
    pub fn run(&self) {
        (self.callback.borrow_mut())();
    }

    /// Re-arms a repeating timer to `now + interval`.
    pub fn restart(&self, now: Instant) {
        self.when.set(now + self.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_zero() {
        let t1 = Timer::new(Box::new(|| {}), Instant::now(), Duration::ZERO, 0);
        let t2 = Timer::new(Box::new(|| {}), Instant::now(), Duration::ZERO, 1);
        assert_ne!(t1.id(), INVALID_TIMER_ID);
        assert_ne!(t2.id(), INVALID_TIMER_ID);
        assert_ne!(t1.id(), t2.id());
    }

    #[test]
    fn repeat_restarts_relative_to_now() {
        let t = Timer::new(Box::new(|| {}), Instant::now(), Duration::from_millis(50), 0);
        assert!(t.is_repeat());
        let now = Instant::now();
        t.restart(now);
        assert_eq!(t.when(), now + Duration::from_millis(50));
    }

    #[test]
    fn one_shot_does_not_repeat() {
        let t = Timer::new(Box::new(|| {}), Instant::now(), Duration::ZERO, 0);
        assert!(!t.is_repeat());
    }
}
