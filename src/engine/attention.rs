//! Inactivity and exit-intent detection for the questionnaire.
//!
//! Both detectors run on one [`Scheduler`]. Every blocking modal (welcome
//! banner, phase completion, idle confirmation, exit intent) bumps the
//! scheduler's suspend count; while any is open no timer fires and the idle
//! state is held at its reset value. Closing the last modal re-arms the idle
//! delay from scratch.
//!
//! Timings depend on the phase being answered: later phases carry harder
//! questions and get a longer grace period before the visitor is flagged idle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use super::scheduler::{Scheduler, TimerName};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityTiming {
    pub idle_delay_ms: u64,
    pub countdown_secs: u32,
}

impl InactivityTiming {
    pub const fn new(idle_delay_ms: u64, countdown_secs: u32) -> Self {
        Self {
            idle_delay_ms,
            countdown_secs,
        }
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    fn is_usable(&self) -> bool {
        self.idle_delay_ms > 0 && self.countdown_secs > 0
    }
}

/// Per-phase inactivity timings. Missing or zeroed entries fall back to `default`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InactivityProfile {
    pub phase1: Option<InactivityTiming>,
    pub phase2: Option<InactivityTiming>,
    pub phase3: Option<InactivityTiming>,
    pub default: InactivityTiming,
}

impl Default for InactivityProfile {
    fn default() -> Self {
        Self {
            phase1: Some(InactivityTiming::new(30_000, 35)),
            phase2: Some(InactivityTiming::new(45_000, 40)),
            phase3: Some(InactivityTiming::new(60_000, 50)),
            default: InactivityTiming::new(45_000, 40),
        }
    }
}

impl InactivityProfile {
    pub fn for_phase(&self, phase_number: usize) -> InactivityTiming {
        let entry = match phase_number {
            1 => self.phase1,
            2 => self.phase2,
            3 => self.phase3,
            _ => None,
        };
        match entry {
            Some(timing) if timing.is_usable() => timing,
            _ if self.default.is_usable() => self.default,
            _ => InactivityProfile::default().default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModalKind {
    Welcome,
    PhaseCompletion,
    IdleConfirm,
    ExitIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionEvent {
    IdleStarted { countdown: u32 },
    CountdownTick { remaining: u32 },
    IdleConfirmOpened,
    ExitIntentOpened,
}

#[derive(Debug)]
pub struct AttentionMonitor {
    profile: InactivityProfile,
    timing: InactivityTiming,
    phase: usize,
    scheduler: Scheduler,
    modals: BTreeSet<ModalKind>,
    idle: bool,
    countdown_remaining: u32,
    exit_intent_fired: bool,
}

impl AttentionMonitor {
    /// A monitor with nothing armed yet. Call [`start`](Self::start) or open a modal.
    pub fn new(profile: InactivityProfile, phase: usize) -> Self {
        let timing = profile.for_phase(phase);
        Self {
            profile,
            timing,
            phase,
            scheduler: Scheduler::new(),
            modals: BTreeSet::new(),
            idle: false,
            countdown_remaining: timing.countdown_secs,
            exit_intent_fired: false,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if !self.scheduler.is_suspended() {
            self.reset_idle();
            self.arm_idle_delay(now);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn timing(&self) -> InactivityTiming {
        self.timing
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn exit_intent_fired(&self) -> bool {
        self.exit_intent_fired
    }

    pub fn is_modal_open(&self, kind: ModalKind) -> bool {
        self.modals.contains(&kind)
    }

    pub fn any_modal_open(&self) -> bool {
        !self.modals.is_empty()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Switch timings when the visitor moves to another phase.
    pub fn set_phase(&mut self, phase: usize, now: Instant) {
        if phase == self.phase {
            return;
        }
        self.phase = phase;
        self.timing = self.profile.for_phase(phase);
        self.reset_idle();
        if !self.scheduler.is_suspended() {
            self.arm_idle_delay(now);
        }
    }

    /// Key press, pointer move or click. Ignored while a modal owns focus.
    pub fn activity(&mut self, now: Instant) {
        if self.scheduler.is_suspended() {
            return;
        }
        self.reset_idle();
        self.arm_idle_delay(now);
    }

    pub fn open_modal(&mut self, kind: ModalKind) {
        if !self.modals.insert(kind) {
            return;
        }
        self.scheduler.suspend();
        self.scheduler.cancel_all();
        self.reset_idle();
    }

    pub fn close_modal(&mut self, kind: ModalKind, now: Instant) {
        if !self.modals.remove(&kind) {
            return;
        }
        self.scheduler.resume();
        if !self.scheduler.is_suspended() {
            self.reset_idle();
            self.arm_idle_delay(now);
        }
    }

    /// Pointer crossed the top edge of the viewport. Fires at most once per run.
    pub fn pointer_left_top(&mut self) -> Option<AttentionEvent> {
        if self.exit_intent_fired || self.scheduler.is_suspended() {
            return None;
        }
        self.exit_intent_fired = true;
        self.open_modal(ModalKind::ExitIntent);
        Some(AttentionEvent::ExitIntentOpened)
    }

    /// Fire every timer due at `now`, in deadline order.
    pub fn tick(&mut self, now: Instant) -> Vec<AttentionEvent> {
        let mut events = Vec::new();

        while let Some((name, deadline)) = self.scheduler.pop_due(now) {
            match name {
                TimerName::IdleDelay => {
                    self.idle = true;
                    self.countdown_remaining = self.timing.countdown_secs;
                    self.scheduler
                        .arm_at(TimerName::CountdownTick, deadline + COUNTDOWN_STEP);
                    events.push(AttentionEvent::IdleStarted {
                        countdown: self.countdown_remaining,
                    });
                }
                TimerName::CountdownTick => {
                    self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
                    if self.countdown_remaining == 0 {
                        events.push(AttentionEvent::IdleConfirmOpened);
                        self.open_modal(ModalKind::IdleConfirm);
                    } else {
                        self.scheduler
                            .arm_at(TimerName::CountdownTick, deadline + COUNTDOWN_STEP);
                        events.push(AttentionEvent::CountdownTick {
                            remaining: self.countdown_remaining,
                        });
                    }
                }
            }
        }

        events
    }

    fn reset_idle(&mut self) {
        self.idle = false;
        self.countdown_remaining = self.timing.countdown_secs;
        self.scheduler.cancel(TimerName::CountdownTick);
    }

    fn arm_idle_delay(&mut self, now: Instant) {
        self.scheduler
            .arm(TimerName::IdleDelay, now, self.timing.idle_delay());
    }
}
