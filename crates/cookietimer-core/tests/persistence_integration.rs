//! Integration tests for storage across reopen, delete and undo.

use chrono::{Duration, Utc};
use cookietimer_core::view::{rows, DONE_LABEL};
use cookietimer_core::{CoreError, Database, NewTimer, TemperatureUnit, TimerStatus};

#[test]
fn added_timer_survives_reopen_and_renders() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cookietimer.db");
    let now = Utc::now();

    let id = {
        let db = Database::open_at(&path).unwrap();
        let draft =
            NewTimer::parse("Brownies", "25", Some("350"), TemperatureUnit::Fahrenheit).unwrap();
        let (timer, _) = db.add_timer(draft, now).unwrap();
        db.start_timer(timer.id, now).unwrap();
        timer.id
    };

    let db = Database::open_at(&path).unwrap();
    let timer = db.get_timer(id).unwrap().unwrap();
    assert_eq!(timer.status(), TimerStatus::Running);
    assert_eq!(timer.original_input_unit, Some(TemperatureUnit::Fahrenheit));

    let listed = db.list_timers().unwrap();
    let row = &rows(&listed, TemperatureUnit::Celsius, now + Duration::seconds(60))[0];
    assert_eq!(row.countdown, "24:00");
    assert_eq!(row.temperature.as_deref(), Some("177°C"));
    assert!(row.can_stop);
}

#[test]
fn delete_and_undo_restore_an_equivalent_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cookietimer.db");
    let now = Utc::now();
    let window = Duration::seconds(30);

    let db = Database::open_at(&path).unwrap();
    let draft = NewTimer::parse("Shortbread", "20", Some("4"), TemperatureUnit::GasMark).unwrap();
    let (timer, _) = db.add_timer(draft, now).unwrap();
    db.start_timer(timer.id, now).unwrap();
    db.delete_with_undo(timer.id, now + Duration::seconds(90), window)
        .unwrap()
        .unwrap();
    assert!(db.list_timers().unwrap().is_empty());
    drop(db);

    // Undo from a fresh connection, as a second CLI invocation would.
    let db = Database::open_at(&path).unwrap();
    let (restored, _) = db
        .undo_delete(now + Duration::seconds(100), window)
        .unwrap()
        .unwrap();
    assert_eq!(restored.id, timer.id);
    assert_eq!(restored.name, "Shortbread");
    assert_eq!(restored.remaining_secs, 20 * 60 - 90);
    assert!(!restored.is_running);
    assert_eq!(db.list_timers().unwrap(), vec![restored]);

    // The stash is single use.
    assert!(db.undo_delete(now + Duration::seconds(101), window).unwrap().is_none());
}

#[test]
fn late_undo_is_refused() {
    let db = Database::open_memory().unwrap();
    let now = Utc::now();
    let window = Duration::seconds(30);
    let draft = NewTimer::parse("Flapjack", "15", None, TemperatureUnit::Celsius).unwrap();
    let (timer, _) = db.add_timer(draft, now).unwrap();
    db.delete_with_undo(timer.id, now, window).unwrap();

    let err = db.undo_delete(now + Duration::seconds(31), window).unwrap_err();
    assert!(matches!(err, CoreError::UndoExpired { window_secs: 30 }));
    assert!(db.list_timers().unwrap().is_empty());
}

#[test]
fn completed_rows_show_done() {
    let db = Database::open_memory().unwrap();
    let now = Utc::now();
    let draft = NewTimer::parse("Scones", "12", None, TemperatureUnit::Celsius).unwrap();
    let (timer, _) = db.add_timer(draft, now).unwrap();
    db.start_timer(timer.id, now).unwrap();
    let anchor = db.get_timer(timer.id).unwrap().unwrap().anchor().unwrap();
    assert!(db.mark_completed(timer.id, anchor).unwrap());

    let listed = db.list_timers().unwrap();
    let row = &rows(&listed, TemperatureUnit::Celsius, now)[0];
    assert_eq!(row.countdown, DONE_LABEL);
    assert!(!row.can_start);
    assert!(row.can_reset);
}
