//! Presentation model for the timer list.
//!
//! Front ends render [`TimerRow`]s rather than raw records. [`diff_rows`]
//! compares two snapshots by id so a live view can redraw only what moved.

mod theme;

pub use theme::{Palette, Theme};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::timer::{Timer, TimerId, TimerStatus};
use crate::units::TemperatureUnit;

/// Text shown instead of a countdown once a timer has finished.
pub const DONE_LABEL: &str = "Done!";

/// Format seconds as `MM:SS`. Minutes are not wrapped into hours.
pub fn format_time(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// One rendered line of the timer list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerRow {
    pub id: TimerId,
    pub name: String,
    pub status: TimerStatus,
    pub remaining_secs: u32,
    /// `MM:SS`, or [`DONE_LABEL`] for a completed timer.
    pub countdown: String,
    pub temperature: Option<String>,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_reset: bool,
}

impl TimerRow {
    pub fn from_timer(timer: &Timer, unit: TemperatureUnit, now: DateTime<Utc>) -> Self {
        let remaining_secs = timer.projected_remaining(now);
        let countdown = if timer.is_completed {
            DONE_LABEL.to_string()
        } else {
            format_time(remaining_secs)
        };
        Self {
            id: timer.id,
            name: timer.name.clone(),
            status: timer.status(),
            remaining_secs,
            countdown,
            temperature: timer.temperature_celsius.map(|c| unit.display(c)),
            can_start: !timer.is_running && !timer.is_completed,
            can_stop: timer.is_running,
            can_reset: true,
        }
    }
}

/// Render a whole list in store order.
pub fn rows(timers: &[Timer], unit: TemperatureUnit, now: DateTime<Utc>) -> Vec<TimerRow> {
    timers
        .iter()
        .map(|t| TimerRow::from_timer(t, unit, now))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Inserted(TimerRow),
    Removed(TimerId),
    /// Only the countdown moved; the rest of the row is unchanged.
    TimeChanged { id: TimerId, remaining_secs: u32 },
    /// Anything else changed and the whole row must be redrawn.
    Rebind(TimerId),
}

/// Compare two row lists keyed by id.
///
/// Removals come first, then changes and insertions in `new` order.
pub fn diff_rows(old: &[TimerRow], new: &[TimerRow]) -> Vec<RowChange> {
    let mut changes: Vec<RowChange> = old
        .iter()
        .filter(|o| !new.iter().any(|n| n.id == o.id))
        .map(|o| RowChange::Removed(o.id))
        .collect();

    for row in new {
        let Some(prev) = old.iter().find(|o| o.id == row.id) else {
            changes.push(RowChange::Inserted(row.clone()));
            continue;
        };
        if prev == row {
            continue;
        }
        let same_apart_from_time = TimerRow {
            remaining_secs: row.remaining_secs,
            countdown: row.countdown.clone(),
            ..prev.clone()
        } == *row;
        if same_apart_from_time {
            changes.push(RowChange::TimeChanged {
                id: row.id,
                remaining_secs: row.remaining_secs,
            });
        } else {
            changes.push(RowChange::Rebind(row.id));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::NewTimer;
    use chrono::Duration;

    fn timer(id: TimerId, name: &str, secs: u32, temp: Option<f64>) -> Timer {
        let mut t = Timer::new(NewTimer {
            name: name.into(),
            duration_secs: secs,
            temperature_celsius: temp,
            input_unit: TemperatureUnit::Celsius,
        });
        t.id = id;
        t
    }

    #[test]
    fn format_time_pads_and_keeps_long_minutes() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(65), "01:05");
        assert_eq!(format_time(600), "10:00");
        assert_eq!(format_time(7200), "120:00");
    }

    #[test]
    fn idle_row_can_start_but_not_stop() {
        let now = Utc::now();
        let row = TimerRow::from_timer(&timer(1, "Scones", 900, Some(180.0)), TemperatureUnit::Celsius, now);
        assert_eq!(row.countdown, "15:00");
        assert_eq!(row.temperature.as_deref(), Some("180°C"));
        assert!(row.can_start);
        assert!(!row.can_stop);
        assert!(row.can_reset);
    }

    #[test]
    fn running_row_projects_remaining_time() {
        let now = Utc::now();
        let mut t = timer(1, "Scones", 900, None);
        t.start(now);
        let row = TimerRow::from_timer(&t, TemperatureUnit::Celsius, now + Duration::seconds(30));
        assert_eq!(row.countdown, "14:30");
        assert!(!row.can_start);
        assert!(row.can_stop);
        assert!(row.temperature.is_none());
    }

    #[test]
    fn completed_row_shows_done() {
        let now = Utc::now();
        let mut t = timer(1, "Scones", 900, Some(180.0));
        t.complete(now);
        let row = TimerRow::from_timer(&t, TemperatureUnit::Fahrenheit, now);
        assert_eq!(row.countdown, DONE_LABEL);
        assert_eq!(row.temperature.as_deref(), Some("356°F"));
        assert!(!row.can_start);
        assert!(!row.can_stop);
        assert!(row.can_reset);
    }

    #[test]
    fn diff_detects_insert_remove_and_time_changes() {
        let now = Utc::now();
        let unit = TemperatureUnit::Celsius;
        let a = timer(1, "A", 60, None);
        let b = timer(2, "B", 60, None);
        let old = rows(&[a.clone(), b], unit, now);

        let mut a_ticked = a.clone();
        a_ticked.remaining_secs = 59;
        let c = timer(3, "C", 60, None);
        let new = rows(&[a_ticked, c.clone()], unit, now);

        let changes = diff_rows(&old, &new);
        assert_eq!(
            changes,
            vec![
                RowChange::Removed(2),
                RowChange::TimeChanged { id: 1, remaining_secs: 59 },
                RowChange::Inserted(TimerRow::from_timer(&c, unit, now)),
            ]
        );
    }

    #[test]
    fn diff_rebinds_on_state_change() {
        let now = Utc::now();
        let unit = TemperatureUnit::Celsius;
        let a = timer(1, "A", 60, None);
        let mut started = a.clone();
        started.start(now);

        let old = rows(&[a], unit, now);
        let new = rows(&[started], unit, now);
        assert_eq!(diff_rows(&old, &new), vec![RowChange::Rebind(1)]);
        assert!(diff_rows(&new, &new).is_empty());
    }
}
