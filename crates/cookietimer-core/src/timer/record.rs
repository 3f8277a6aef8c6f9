//! The timer record.
//!
//! A `Timer` is both the persisted row and the in-memory value the list and
//! the service work with. All state changes go through the methods below so
//! that the invariants hold no matter who mutates the record:
//!
//! - `remaining_secs` stays within `[0, initial_duration_secs]`
//! - `is_running` and `is_completed` are never both set
//! - a running timer always carries `last_started_at`
//!
//! ## Anchor
//!
//! While running, `remaining_secs` is the remaining time measured at
//! `last_started_at`. The service rewrites both on every persisted tick, so
//! after a process death the remaining time is recomputed as
//! `remaining_secs - (now - last_started_at)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::input::NewTimer;
use crate::error::ValidationError;
use crate::events::Event;
use crate::units::TemperatureUnit;

pub type TimerId = i64;

/// Derived, display-oriented view of the two state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    /// Never started since creation or the last reset.
    Idle,
    Running,
    /// Stopped part-way through.
    Paused,
    Completed,
}

/// The `(last_started_at, remaining_secs)` pair of a running timer.
///
/// Whoever last wrote the anchor owns the countdown. Writers compare it
/// before re-anchoring so that a start or reset from elsewhere is never
/// overwritten by an older countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub started_at: DateTime<Utc>,
    pub remaining_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub id: TimerId,
    pub name: String,
    pub initial_duration_secs: u32,
    pub remaining_secs: u32,
    pub is_running: bool,
    pub is_completed: bool,
    #[serde(default)]
    pub temperature_celsius: Option<f64>,
    #[serde(default)]
    pub original_input_unit: Option<TemperatureUnit>,
    #[serde(default)]
    pub last_started_at: Option<DateTime<Utc>>,
}

impl Timer {
    /// Build a stopped, full-length record from validated input.
    ///
    /// The id stays 0 until the store assigns one.
    pub fn new(draft: NewTimer) -> Self {
        Self {
            id: 0,
            name: draft.name,
            initial_duration_secs: draft.duration_secs,
            remaining_secs: draft.duration_secs,
            is_running: false,
            is_completed: false,
            temperature_celsius: draft.temperature_celsius,
            original_input_unit: draft.temperature_celsius.map(|_| draft.input_unit),
            last_started_at: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> TimerStatus {
        if self.is_completed {
            TimerStatus::Completed
        } else if self.is_running {
            TimerStatus::Running
        } else if self.remaining_secs < self.initial_duration_secs {
            TimerStatus::Paused
        } else {
            TimerStatus::Idle
        }
    }

    /// Current anchor, or `None` unless running.
    pub fn anchor(&self) -> Option<Anchor> {
        match (self.is_running, self.last_started_at) {
            (true, Some(started_at)) => Some(Anchor {
                started_at,
                remaining_secs: self.remaining_secs,
            }),
            _ => None,
        }
    }

    /// Whole seconds elapsed since the anchor, never negative.
    pub fn elapsed_since_anchor(&self, now: DateTime<Utc>) -> u64 {
        self.last_started_at
            .map(|at| (now - at).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Remaining seconds at `now`, accounting for time spent running since
    /// the anchor. Stopped timers report `remaining_secs` unchanged.
    pub fn projected_remaining(&self, now: DateTime<Utc>) -> u32 {
        if !self.is_running {
            return self.remaining_secs;
        }
        let elapsed = self.elapsed_since_anchor(now);
        u64::from(self.remaining_secs).saturating_sub(elapsed) as u32
    }

    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        let broken = |message: &str| {
            Err(ValidationError::BrokenInvariant {
                id: self.id,
                message: message.to_string(),
            })
        };
        if self.remaining_secs > self.initial_duration_secs {
            return broken("remaining time exceeds the initial duration");
        }
        if self.is_running && self.is_completed {
            return broken("running and completed at the same time");
        }
        if self.is_running && self.last_started_at.is_none() {
            return broken("running without a start timestamp");
        }
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or restart) the countdown.
    ///
    /// Clears the completed flag whatever the prior state was. A completed
    /// or fully elapsed timer starts over from its initial duration.
    pub fn start(&mut self, now: DateTime<Utc>) -> Event {
        let remaining = self.projected_remaining(now);
        self.remaining_secs = if self.is_completed || remaining == 0 {
            self.initial_duration_secs
        } else {
            remaining
        };
        self.is_running = true;
        self.is_completed = false;
        self.last_started_at = Some(now);
        Event::TimerStarted {
            id: self.id,
            remaining_secs: self.remaining_secs,
            at: now,
        }
    }

    /// Halt the countdown, keeping whatever time is left.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.is_running {
            return None;
        }
        self.remaining_secs = self.projected_remaining(now);
        self.is_running = false;
        self.last_started_at = None;
        Some(Event::TimerStopped {
            id: self.id,
            remaining_secs: self.remaining_secs,
            at: now,
        })
    }

    pub fn reset(&mut self, now: DateTime<Utc>) -> Event {
        self.remaining_secs = self.initial_duration_secs;
        self.is_running = false;
        self.is_completed = false;
        self.last_started_at = None;
        Event::TimerReset {
            id: self.id,
            remaining_secs: self.remaining_secs,
            at: now,
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Event {
        self.remaining_secs = 0;
        self.is_running = false;
        self.is_completed = true;
        self.last_started_at = None;
        Event::TimerCompleted { id: self.id, at: now }
    }

    /// Re-anchor a running timer at `at` with `remaining` seconds left.
    ///
    /// Ignored for stopped timers.
    pub fn record_tick(&mut self, remaining: u32, at: DateTime<Utc>) {
        if !self.is_running {
            return;
        }
        self.remaining_secs = remaining.min(self.initial_duration_secs);
        self.last_started_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn timer(duration_secs: u32) -> Timer {
        Timer::new(NewTimer {
            name: "Cookies".into(),
            duration_secs,
            temperature_celsius: None,
            input_unit: TemperatureUnit::Celsius,
        })
    }

    #[test]
    fn new_timer_is_idle_and_full() {
        let t = timer(600);
        assert_eq!(t.status(), TimerStatus::Idle);
        assert_eq!(t.remaining_secs, 600);
        assert!(t.original_input_unit.is_none());
        t.check_invariants().unwrap();
    }

    #[test]
    fn start_clears_completed_and_restores_duration() {
        let now = Utc::now();
        let mut t = timer(600);
        t.complete(now);
        assert_eq!(t.status(), TimerStatus::Completed);

        let event = t.start(now);
        assert!(t.is_running);
        assert!(!t.is_completed);
        assert_eq!(t.remaining_secs, 600);
        assert_eq!(t.last_started_at, Some(now));
        assert!(matches!(event, Event::TimerStarted { remaining_secs: 600, .. }));
    }

    #[test]
    fn start_resumes_paused_time() {
        let now = Utc::now();
        let mut t = timer(600);
        t.remaining_secs = 245;
        t.start(now);
        assert_eq!(t.remaining_secs, 245);
    }

    #[test]
    fn stop_preserves_remaining_time() {
        let now = Utc::now();
        let mut t = timer(600);
        t.start(now);
        let event = t.stop(now + Duration::seconds(90)).unwrap();
        assert_eq!(t.remaining_secs, 510);
        assert!(!t.is_running);
        assert!(t.last_started_at.is_none());
        assert_eq!(t.status(), TimerStatus::Paused);
        assert!(matches!(event, Event::TimerStopped { remaining_secs: 510, .. }));

        // Time passing while stopped changes nothing.
        assert_eq!(t.projected_remaining(now + Duration::hours(3)), 510);
        assert!(t.stop(now + Duration::hours(3)).is_none());
    }

    #[test]
    fn reset_restores_initial_duration() {
        let now = Utc::now();
        let mut t = timer(600);
        t.start(now);
        t.complete(now);
        t.reset(now);
        assert_eq!(t.remaining_secs, 600);
        assert!(!t.is_completed);
        assert!(!t.is_running);
        assert_eq!(t.status(), TimerStatus::Idle);
    }

    #[test]
    fn projection_uses_anchor_and_clamps_at_zero() {
        let now = Utc::now();
        let mut t = timer(60);
        t.start(now);
        assert_eq!(t.projected_remaining(now + Duration::milliseconds(999)), 60);
        assert_eq!(t.projected_remaining(now + Duration::seconds(45)), 15);
        assert_eq!(t.projected_remaining(now + Duration::minutes(5)), 0);
        // Clock going backwards does not add time.
        assert_eq!(t.projected_remaining(now - Duration::seconds(30)), 60);
    }

    #[test]
    fn record_tick_reanchors_running_timer_only() {
        let now = Utc::now();
        let mut t = timer(60);
        t.record_tick(10, now);
        assert_eq!(t.remaining_secs, 60);

        t.start(now);
        let later = now + Duration::seconds(20);
        t.record_tick(40, later);
        assert_eq!(t.last_started_at, Some(later));
        assert_eq!(t.projected_remaining(later + Duration::seconds(5)), 35);
    }

    #[test]
    fn anchor_only_exists_while_running() {
        let now = Utc::now();
        let mut t = timer(60);
        assert_eq!(t.anchor(), None);

        t.start(now);
        assert_eq!(
            t.anchor(),
            Some(Anchor {
                started_at: now,
                remaining_secs: 60
            })
        );

        t.stop(now + Duration::seconds(5));
        assert_eq!(t.anchor(), None);
    }

    #[test]
    fn invariant_violations_are_reported() {
        let mut t = timer(60);
        t.remaining_secs = 61;
        assert!(t.check_invariants().is_err());

        let mut t = timer(60);
        t.is_running = true;
        assert!(t.check_invariants().is_err());

        let mut t = timer(60);
        t.is_running = true;
        t.is_completed = true;
        t.last_started_at = Some(Utc::now());
        assert!(t.check_invariants().is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Stop,
        Reset,
        Complete,
        Tick(u32),
        Wait(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Stop),
            Just(Op::Reset),
            Just(Op::Complete),
            (0u32..2000).prop_map(Op::Tick),
            (-5i64..900).prop_map(Op::Wait),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_for_any_sequence(
            duration in 1u32..3600,
            ops in proptest::collection::vec(op(), 0..40),
        ) {
            let mut now = Utc::now();
            let mut t = timer(duration);
            for op in ops {
                match op {
                    Op::Start => { t.start(now); }
                    Op::Stop => { t.stop(now); }
                    Op::Reset => { t.reset(now); }
                    Op::Complete => { t.complete(now); }
                    Op::Tick(r) => t.record_tick(r, now),
                    Op::Wait(s) => now += Duration::seconds(s),
                }
                prop_assert!(t.check_invariants().is_ok(), "{:?}", t);
                prop_assert!(t.projected_remaining(now) <= t.initial_duration_secs);
            }
        }

        #[test]
        fn start_always_runs_and_uncompletes(
            duration in 1u32..3600,
            remaining in 0u32..3600,
            completed in any::<bool>(),
        ) {
            let mut t = timer(duration);
            t.remaining_secs = remaining.min(duration);
            t.is_completed = completed;
            t.start(Utc::now());
            prop_assert!(t.is_running);
            prop_assert!(!t.is_completed);
            prop_assert!(t.remaining_secs > 0);
        }
    }
}
