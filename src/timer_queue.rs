//! Timer heap + timerfd rearm logic
//! (`original_source/time/TimerQueue.cpp`).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::os::fd::{AsFd, OwnedFd};
use std::rc::Rc;
use std::time::{Duration, Instant};

use rustix::time::{
    timerfd_create, timerfd_settime, Itimerspec, TimerfdClockId, TimerfdFlags, TimerfdTimerFlags,
    Timespec,
};

use crate::timer::{Timer, TimerId};

/// Floor below which a rearm interval is clamped, to avoid pathological
/// timerfd spins (spec.md §4.3).
const MIN_INTERVAL: Duration = Duration::from_micros(100);

pub fn create_timerfd() -> std::io::Result<OwnedFd> {
    timerfd_create(
        TimerfdClockId::Monotonic,
        TimerfdFlags::NONBLOCK | TimerfdFlags::CLOEXEC,
    )
    .map_err(std::io::Error::from)
}

fn duration_to_timespec(d: Duration) -> Timespec {
    Timespec {
        tv_sec: d.as_secs() as _,
        tv_nsec: Duration::from(d).subsec_nanos() as _,
    }
}

fn how_much_time_from_now(when: Instant) -> Duration {
    let now = Instant::now();
    let raw = if when > now {
        when - now
    } else {
        Duration::ZERO
    };
    if raw < MIN_INTERVAL {
        MIN_INTERVAL
    } else {
        raw
    }
}

pub fn reset_timerfd(timerfd: &OwnedFd, expiration: Instant) {
    let new_value = Itimerspec {
        it_interval: Timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
        it_value: duration_to_timespec(how_much_time_from_now(expiration)),
    };
    if let Err(err) = timerfd_settime(timerfd.as_fd(), TimerfdTimerFlags::empty(), &new_value) {
        tracing::error!(error = %std::io::Error::from(err), "timerfd_settime() failed");
    }
}

pub fn read_timerfd(timerfd: &OwnedFd) {
    let mut buf = [0u8; 8];
    match rustix::io::read(timerfd, &mut buf) {
        Ok(n) if n == buf.len() => {}
        Ok(n) => tracing::error!(n, "read timerfd returned short read"),
        Err(err) => tracing::error!(error = %std::io::Error::from(err), "read timerfd failed"),
    }
}

/// Orders timers by `(when, seq)` ascending so `Reverse` makes the
/// `BinaryHeap` pop the earliest-scheduled timer first, ties broken by
/// insertion order (spec.md §4.3).
struct HeapKey(Rc<Timer>);

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.when() == other.0.when() && self.0.seq() == other.0.seq()
    }
}
impl Eq for HeapKey {}
impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.0.when(), self.0.seq()).cmp(&(other.0.when(), other.0.seq()))
    }
}

/// Min-heap of pending timers plus a tombstone set of still-live IDs
/// (spec.md §3 "Timer service").
pub struct TimerQueue {
    timerfd: OwnedFd,
    timers: BinaryHeap<Reverse<HeapKey>>,
    live_ids: HashSet<TimerId>,
    next_seq: u64,
}

impl TimerQueue {
    /// # Errors
    /// Propagates `timerfd_create` failure.
    pub fn new() -> std::io::Result<Self> {
        Ok(TimerQueue {
            timerfd: create_timerfd()?,
            timers: BinaryHeap::new(),
            live_ids: HashSet::new(),
            next_seq: 0,
        })
    }

    #[must_use]
    pub fn timerfd(&self) -> &OwnedFd {
        &self.timerfd
    }

    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Inserts `timer`, recording its ID as live. Returns whether this
    /// timer became the new earliest deadline (caller must then rearm the
    /// timerfd).
    pub fn insert(&mut self, timer: Rc<Timer>) -> bool {
        self.live_ids.insert(timer.id());
        let earliest_changed = self
            .timers
            .peek()
            .is_none_or(|Reverse(top)| timer.when() < top.0.when());
        self.timers.push(Reverse(HeapKey(timer)));
        earliest_changed
    }

    /// Marks `id` as cancelled; the heap entry is garbage-collected when
    /// it is eventually popped.
    pub fn cancel(&mut self, id: TimerId) {
        self.live_ids.remove(&id);
    }

    #[must_use]
    pub fn earliest_when(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse(k)| k.0.when())
    }

    /// Pops every timer with `when <= now` into the returned vector, in
    /// ascending `(when, seq)` order.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<Rc<Timer>> {
        let mut expired = Vec::new();
        while let Some(Reverse(top)) = self.timers.peek() {
            if top.0.when() > now {
                break;
            }
            let Reverse(HeapKey(timer)) = self.timers.pop().unwrap();
            expired.push(timer);
        }
        expired
    }

    #[must_use]
    pub fn is_live(&self, id: TimerId) -> bool {
        self.live_ids.contains(&id)
    }

    /// After a firing batch: repeating live timers are restarted and
    /// reinserted, one-shot live timers are dropped from the live set,
    /// and — if anything remains — the timerfd is rearmed to the new
    /// minimum (spec.md §4.3 "reset").
    pub fn reset_after_batch(&mut self, expired: Vec<Rc<Timer>>, now: Instant) {
        for timer in expired {
            if self.live_ids.contains(&timer.id()) {
                if timer.is_repeat() {
                    timer.restart(now);
                    self.timers.push(Reverse(HeapKey(timer)));
                } else {
                    self.live_ids.remove(&timer.id());
                }
            }
        }
        if let Some(when) = self.earliest_when() {
            reset_timerfd(&self.timerfd, when);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_timer(when: Instant, interval: Duration, seq: u64) -> Rc<Timer> {
        Rc::new(Timer::new(Box::new(|| {}), when, interval, seq))
    }

    #[test]
    fn pops_in_ascending_deadline_order() {
        let mut q = TimerQueue::new().expect("timerfd_create");
        let base = Instant::now();
        let t1 = make_timer(base + Duration::from_millis(10), Duration::ZERO, 0);
        let t2 = make_timer(base + Duration::from_millis(5), Duration::ZERO, 1);
        let t3 = make_timer(base + Duration::from_millis(20), Duration::ZERO, 2);
        q.insert(Rc::clone(&t1));
        q.insert(Rc::clone(&t2));
        q.insert(Rc::clone(&t3));

        let expired = q.pop_expired(base + Duration::from_millis(25));
        let ids: Vec<_> = expired.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![t2.id(), t1.id(), t3.id()]);
    }

    #[test]
    fn cancelled_timer_is_not_live() {
        let mut q = TimerQueue::new().expect("timerfd_create");
        let t = make_timer(Instant::now(), Duration::ZERO, 0);
        q.insert(Rc::clone(&t));
        assert!(q.is_live(t.id()));
        q.cancel(t.id());
        assert!(!q.is_live(t.id()));
    }

    #[test]
    fn earliest_changed_detection() {
        let mut q = TimerQueue::new().expect("timerfd_create");
        let base = Instant::now();
        assert!(q.insert(make_timer(base + Duration::from_millis(10), Duration::ZERO, 0)));
        assert!(!q.insert(make_timer(base + Duration::from_millis(20), Duration::ZERO, 1)));
        assert!(q.insert(make_timer(base + Duration::from_millis(1), Duration::ZERO, 2)));
    }
}
