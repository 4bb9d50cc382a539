//! The discrete-event scheduler.
//!
//! A single monotonic virtual clock in integer microseconds drives every
//! process in the simulation. Wakeups are stored in a min-heap ordered by
//! `(time, sequence)`: the sequence number is assigned at scheduling time,
//! so wakeups scheduled for the same instant resume in FIFO order and the
//! pop order is fully deterministic.
//!
//! Cancellation is implicit. Long-lived processes carry an epoch counter;
//! every wakeup records the epoch it was scheduled under, and the dispatch
//! loop discards wakeups whose epoch no longer matches. A resumed process
//! bumps its epoch when it abandons the branches it did not take, so no
//! pending wakeup ever resumes a process that has moved on.

use fanetsim_common::SimTime;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A wakeup waiting on the timeline.
#[derive(Debug)]
struct Scheduled<W> {
    time: SimTime,
    seq: u64,
    wakeup: W,
}

impl<W> PartialEq for Scheduled<W> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<W> Eq for Scheduled<W> {}

impl<W> PartialOrd for Scheduled<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<W> Ord for Scheduled<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior: earliest (time, seq) pops first.
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

/// Attempt to schedule a wakeup before the current instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PastSchedule {
    pub at: SimTime,
    pub now: SimTime,
}

/// The event queue: virtual clock plus pending wakeups.
#[derive(Debug)]
pub struct EventQueue<W> {
    heap: BinaryHeap<Scheduled<W>>,
    now: SimTime,
    seq: u64,
}

impl<W> EventQueue<W> {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            now: SimTime::ZERO,
            seq: 0,
        }
    }

    /// The current virtual time. Never decreases.
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    /// Schedules a wakeup `dt` from now.
    pub fn schedule_in(&mut self, dt: SimTime, wakeup: W) {
        let time = self.now + dt;
        self.push(time, wakeup);
    }

    /// Schedules a wakeup at an absolute instant, which must not precede
    /// the current time.
    pub fn schedule_at(&mut self, at: SimTime, wakeup: W) -> Result<(), PastSchedule> {
        if at < self.now {
            return Err(PastSchedule { at, now: self.now });
        }
        self.push(at, wakeup);
        Ok(())
    }

    fn push(&mut self, time: SimTime, wakeup: W) {
        self.seq += 1;
        self.heap.push(Scheduled {
            time,
            seq: self.seq,
            wakeup,
        });
    }

    /// Pops the next wakeup due at or before `until`, advancing the clock
    /// to its instant. Returns `None` when nothing is due in the window.
    pub fn pop_until(&mut self, until: SimTime) -> Option<(SimTime, W)> {
        let due = self.heap.peek().map(|s| s.time)?;
        if due > until {
            return None;
        }
        let entry = self.heap.pop().expect("peeked entry present");
        self.now = entry.time;
        Some((entry.time, entry.wakeup))
    }

    /// Moves the clock forward to `t` without dispatching anything.
    /// Used to land exactly on a run horizon after draining earlier events.
    pub fn advance_to(&mut self, t: SimTime) {
        if t > self.now {
            self.now = t;
        }
    }
}

impl<W> Default for EventQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_time_order() {
        let mut q = EventQueue::new();
        q.schedule_in(SimTime::from_micros(30), "c");
        q.schedule_in(SimTime::from_micros(10), "a");
        q.schedule_in(SimTime::from_micros(20), "b");

        let horizon = SimTime::from_secs(1);
        assert_eq!(q.pop_until(horizon), Some((SimTime::from_micros(10), "a")));
        assert_eq!(q.pop_until(horizon), Some((SimTime::from_micros(20), "b")));
        assert_eq!(q.pop_until(horizon), Some((SimTime::from_micros(30), "c")));
        assert_eq!(q.pop_until(horizon), None);
    }

    #[test]
    fn test_same_instant_is_fifo() {
        let mut q = EventQueue::new();
        let t = SimTime::from_micros(5);
        for i in 0..5 {
            q.schedule_in(t, i);
        }
        let popped: Vec<i32> = std::iter::from_fn(|| q.pop_until(t).map(|(_, w)| w)).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_clock_advances_with_pops() {
        let mut q = EventQueue::new();
        q.schedule_in(SimTime::from_micros(100), ());
        assert_eq!(q.now(), SimTime::ZERO);
        q.pop_until(SimTime::from_secs(1)).unwrap();
        assert_eq!(q.now(), SimTime::from_micros(100));
    }

    #[test]
    fn test_pop_respects_window() {
        let mut q = EventQueue::new();
        q.schedule_in(SimTime::from_micros(100), ());
        assert_eq!(q.pop_until(SimTime::from_micros(99)), None);
        // Nothing popped, clock untouched.
        assert_eq!(q.now(), SimTime::ZERO);
        assert!(q.pop_until(SimTime::from_micros(100)).is_some());
    }

    #[test]
    fn test_schedule_in_past_rejected() {
        let mut q = EventQueue::new();
        q.schedule_in(SimTime::from_micros(50), ());
        q.pop_until(SimTime::from_secs(1));
        let err = q.schedule_at(SimTime::from_micros(10), ()).unwrap_err();
        assert_eq!(err.now, SimTime::from_micros(50));
        assert_eq!(err.at, SimTime::from_micros(10));
    }

    #[test]
    fn test_advance_to_is_monotonic() {
        let mut q: EventQueue<()> = EventQueue::new();
        q.advance_to(SimTime::from_micros(80));
        assert_eq!(q.now(), SimTime::from_micros(80));
        q.advance_to(SimTime::from_micros(40));
        assert_eq!(q.now(), SimTime::from_micros(80));
    }

    #[test]
    fn test_interleaved_scheduling_keeps_fifo() {
        // Wakeups scheduled from within the "handler" of an earlier pop
        // still land behind existing same-instant wakeups.
        let mut q = EventQueue::new();
        let t = SimTime::from_micros(10);
        q.schedule_in(t, 1);
        q.schedule_in(t, 2);
        let (_, first) = q.pop_until(t).unwrap();
        assert_eq!(first, 1);
        // Handler schedules another wakeup for the same instant.
        q.schedule_at(t, 3).unwrap();
        assert_eq!(q.pop_until(t).unwrap().1, 2);
        assert_eq!(q.pop_until(t).unwrap().1, 3);
    }
}
