//! Single-threaded timers driven by an explicit millisecond clock.
//!
//! Nothing here sleeps or spawns. The owner advances the clock from its
//! event loop and runs whatever came due, so every task executes on the
//! same logical thread as the code that scheduled it.

use std::collections::BTreeMap;
use std::time::Duration;

/// Handle for cancelling a one-shot task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId {
    deadline_ms: u64,
    seq: u64,
}

/// One-shot timer queue ordered by deadline, then by insertion.
#[derive(Debug)]
pub struct Scheduler<T> {
    now_ms: u64,
    next_seq: u64,
    queue: BTreeMap<TimerId, T>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            queue: BTreeMap::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn schedule_in(&mut self, delay: Duration, task: T) -> TimerId {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let id = TimerId {
            deadline_ms: self.now_ms.saturating_add(delay_ms),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.queue.insert(id, task);
        id
    }

    /// Cancelling an unknown or already-fired id is a no-op.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.queue.remove(&id)
    }

    /// Moves the clock forward and returns every task now due, oldest
    /// deadline first. The clock never moves backwards.
    pub fn advance_to(&mut self, now_ms: u64) -> Vec<T> {
        self.now_ms = self.now_ms.max(now_ms);
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().deadline_ms > self.now_ms {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.queue.keys().next().map(|id| id.deadline_ms)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-period repeating timer (status polling).
#[derive(Clone, Debug)]
pub struct RepeatingTimer {
    period_ms: u64,
    next_due_ms: Option<u64>,
}

impl RepeatingTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period_ms: u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1),
            next_due_ms: None,
        }
    }

    /// (Re)starts the timer; a running timer is restarted, never doubled.
    pub fn start(&mut self, now_ms: u64) {
        self.next_due_ms = Some(now_ms.saturating_add(self.period_ms));
    }

    /// Idempotent.
    pub fn cancel(&mut self) {
        self.next_due_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    /// Returns true once per elapsed period. Missed periods collapse into a
    /// single firing.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        match self.next_due_ms {
            Some(due) if now_ms >= due => {
                self.next_due_ms = Some(now_ms.saturating_add(self.period_ms));
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_fire_in_deadline_order() {
        let mut sched = Scheduler::new();
        sched.schedule_in(Duration::from_millis(300), "c");
        sched.schedule_in(Duration::from_millis(100), "a");
        sched.schedule_in(Duration::from_millis(100), "b");
        assert!(sched.advance_to(99).is_empty());
        assert_eq!(sched.advance_to(100), vec!["a", "b"]);
        assert_eq!(sched.next_deadline_ms(), Some(300));
        assert_eq!(sched.advance_to(1000), vec!["c"]);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn delays_are_relative_to_current_clock() {
        let mut sched = Scheduler::new();
        sched.advance_to(5_000);
        sched.schedule_in(Duration::from_secs(1), 1);
        assert!(sched.advance_to(5_999).is_empty());
        assert_eq!(sched.advance_to(6_000), vec![1]);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut sched = Scheduler::new();
        let id = sched.schedule_in(Duration::from_millis(10), ());
        assert!(sched.cancel(id).is_some());
        assert!(sched.cancel(id).is_none());
        assert!(sched.advance_to(100).is_empty());
    }

    #[test]
    fn clock_does_not_rewind() {
        let mut sched: Scheduler<()> = Scheduler::new();
        sched.advance_to(50);
        sched.advance_to(10);
        assert_eq!(sched.now_ms(), 50);
    }

    #[test]
    fn repeating_timer_fires_each_period() {
        let mut timer = RepeatingTimer::new(Duration::from_secs(1));
        assert!(!timer.fire_if_due(10_000));
        timer.start(0);
        assert!(!timer.fire_if_due(999));
        assert!(timer.fire_if_due(1_000));
        assert!(!timer.fire_if_due(1_500));
        assert!(timer.fire_if_due(2_000));
        // a long stall fires once, not once per missed period
        assert!(timer.fire_if_due(9_000));
        assert!(!timer.fire_if_due(9_500));
    }

    #[test]
    fn repeating_timer_cancel_twice() {
        let mut timer = RepeatingTimer::new(Duration::from_secs(1));
        timer.start(0);
        timer.cancel();
        timer.cancel();
        assert!(!timer.is_running());
        assert!(!timer.fire_if_due(5_000));
    }
}
