//! Matching in-memory countdowns to the persisted running set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::timer::{Anchor, Timer, TimerId};

/// What the service must do to bring its countdowns in line with storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Active countdowns whose record is gone, no longer running, or was
    /// restarted from a different anchor.
    pub cancel: Vec<TimerId>,
    /// Running records without a matching countdown, with their projected
    /// remaining time.
    pub start: Vec<(TimerId, u32)>,
    /// Running records that ran out while nobody was counting.
    pub complete: Vec<Timer>,
    /// Timers that will still be counting down once the plan is applied.
    pub running_count: usize,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.cancel.is_empty() && self.start.is_empty() && self.complete.is_empty()
    }
}

/// `active` maps each countdown to the anchor it expects its record to carry.
pub fn plan(
    active: &HashMap<TimerId, Anchor>,
    records: &[Timer],
    now: DateTime<Utc>,
) -> ReconcilePlan {
    let owned = |id: TimerId| {
        records
            .iter()
            .any(|t| t.id == id && t.anchor().is_some_and(|a| active.get(&id) == Some(&a)))
    };
    let mut cancel: Vec<TimerId> = active.keys().copied().filter(|id| !owned(*id)).collect();
    cancel.sort_unstable();

    let mut out = ReconcilePlan {
        cancel,
        ..ReconcilePlan::default()
    };

    for timer in records.iter().filter(|t| t.is_running) {
        if owned(timer.id) {
            out.running_count += 1;
            continue;
        }
        match timer.projected_remaining(now) {
            0 => out.complete.push(timer.clone()),
            remaining => {
                out.start.push((timer.id, remaining));
                out.running_count += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use crate::timer::NewTimer;
    use crate::units::TemperatureUnit;
    use chrono::Duration;
    use proptest::prelude::*;

    fn owning(timers: &[&Timer]) -> HashMap<TimerId, Anchor> {
        timers
            .iter()
            .map(|t| (t.id, t.anchor().unwrap()))
            .collect()
    }

    fn timer(id: TimerId, secs: u32) -> Timer {
        let mut t = Timer::new(NewTimer {
            name: format!("timer {id}"),
            duration_secs: secs,
            temperature_celsius: None,
            input_unit: TemperatureUnit::Celsius,
        });
        t.id = id;
        t
    }

    fn running(id: TimerId, secs: u32, started: DateTime<Utc>) -> Timer {
        let mut t = timer(id, secs);
        t.start(started);
        t
    }

    #[test]
    fn starts_running_records_without_countdown() {
        let now = Utc::now();
        let records = vec![running(1, 600, now - Duration::seconds(100)), timer(2, 60)];
        let plan = plan(&HashMap::new(), &records, now);
        assert_eq!(plan.start, vec![(1, 500)]);
        assert!(plan.cancel.is_empty());
        assert!(plan.complete.is_empty());
        assert_eq!(plan.running_count, 1);
    }

    #[test]
    fn cancels_stopped_and_missing_records() {
        let now = Utc::now();
        let records = vec![timer(1, 60), running(2, 60, now)];
        let mut active = owning(&[&records[1]]);
        let stale = running(1, 60, now - Duration::seconds(10)).anchor().unwrap();
        active.insert(1, stale);
        active.insert(3, stale);
        let plan = plan(&active, &records, now);
        assert_eq!(plan.cancel, vec![1, 3]);
        assert!(plan.start.is_empty());
        assert_eq!(plan.running_count, 1);
    }

    #[test]
    fn elapsed_records_complete_instead_of_starting() {
        let now = Utc::now();
        let records = vec![running(1, 60, now - Duration::minutes(5))];
        let plan = plan(&HashMap::new(), &records, now);
        assert!(plan.start.is_empty());
        assert_eq!(plan.complete.len(), 1);
        assert_eq!(plan.complete[0].id, 1);
        assert_eq!(plan.running_count, 0);
    }

    #[test]
    fn matching_state_is_a_no_op() {
        let now = Utc::now();
        let records = vec![running(1, 60, now), timer(2, 60)];
        let active = owning(&[&records[0]]);
        let plan = plan(&active, &records, now);
        assert!(plan.is_empty());
        assert_eq!(plan.running_count, 1);
    }

    #[test]
    fn restarted_record_replaces_its_countdown() {
        let t0 = Utc::now();
        let before = running(1, 600, t0);
        let active = owning(&[&before]);

        // Reset and started again a few seconds later by another process.
        let t1 = t0 + Duration::seconds(3);
        let records = vec![running(1, 600, t1)];
        let plan = plan(&active, &records, t1);
        assert_eq!(plan.cancel, vec![1]);
        assert_eq!(plan.start, vec![(1, 600)]);
        assert_eq!(plan.running_count, 1);
    }

    proptest! {
        #[test]
        fn plan_leaves_exactly_one_countdown_per_running_record(
            specs in proptest::collection::vec((any::<bool>(), 1u32..600, 0i64..900, any::<bool>()), 0..12),
            stale in proptest::collection::hash_set(100i64..110, 0..4),
            drift in proptest::collection::vec(any::<bool>(), 12),
        ) {
            let now = Utc::now();
            let stale_anchor = Anchor { started_at: now, remaining_secs: 1 };
            let mut records = Vec::new();
            let mut active: HashMap<TimerId, Anchor> =
                stale.into_iter().map(|id| (id, stale_anchor)).collect();
            for (i, (is_running, secs, ago, has_countdown)) in specs.into_iter().enumerate() {
                let id = i as TimerId + 1;
                let t = if is_running {
                    running(id, secs, now - Duration::seconds(ago))
                } else {
                    timer(id, secs)
                };
                if has_countdown {
                    // Either the countdown that wrote this anchor, or one
                    // left over from before a restart.
                    let anchor = match t.anchor() {
                        Some(a) if !drift[i] => a,
                        Some(a) => Anchor { remaining_secs: a.remaining_secs + 1, ..a },
                        None => stale_anchor,
                    };
                    active.insert(id, anchor);
                }
                records.push(t);
            }

            let plan = plan(&active, &records, now);

            let mut after: HashSet<TimerId> = active.keys().copied().collect();
            for id in &plan.cancel {
                after.remove(id);
            }
            for (id, remaining) in &plan.start {
                prop_assert!(*remaining > 0);
                prop_assert!(after.insert(*id), "started twice: {}", id);
            }
            for t in &plan.complete {
                prop_assert_eq!(t.projected_remaining(now), 0);
                prop_assert!(!after.contains(&t.id));
            }
            for id in &after {
                prop_assert!(records.iter().any(|t| t.id == *id && t.is_running));
            }
            for (id, anchor) in &active {
                let kept = !plan.cancel.contains(id);
                let matches = records.iter().any(|t| t.id == *id && t.anchor() == Some(*anchor));
                prop_assert_eq!(kept, matches);
            }
            prop_assert_eq!(plan.running_count, after.len());
        }
    }
}
