// Named, cancellable timers with a single suspend gate.
//
// Time is injected by the caller (`Instant`), so the scheduler never sleeps and
// is fully deterministic under test. Arming a name replaces its previous
// deadline: two timers with the same name can never be pending at once.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerName {
    IdleDelay,
    CountdownTick,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: BTreeMap<TimerName, Instant>,
    suspend_depth: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, name: TimerName, now: Instant, after: Duration) {
        self.arm_at(name, now + after);
    }

    pub fn arm_at(&mut self, name: TimerName, deadline: Instant) {
        self.timers.insert(name, deadline);
    }

    pub fn cancel(&mut self, name: TimerName) {
        self.timers.remove(&name);
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_armed(&self, name: TimerName) -> bool {
        self.timers.contains_key(&name)
    }

    pub fn deadline(&self, name: TimerName) -> Option<Instant> {
        self.timers.get(&name).copied()
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn suspend(&mut self) {
        self.suspend_depth += 1;
    }

    pub fn resume(&mut self) {
        self.suspend_depth = self.suspend_depth.saturating_sub(1);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth > 0
    }

    /// Remove and return the earliest timer due at `now`, with its deadline.
    ///
    /// Nothing fires while suspended. Callers loop until `None` so that a
    /// long gap between ticks replays every expiry in deadline order.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerName, Instant)> {
        if self.is_suspended() {
            return None;
        }
        let (name, deadline) = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .min_by_key(|(name, deadline)| (**deadline, **name))
            .map(|(name, deadline)| (*name, *deadline))?;
        self.timers.remove(&name);
        Some((name, deadline))
    }
}
