//! Terminal rendering of the timer list.

use colored::Colorize;
use cookietimer_core::view::TimerRow;
use cookietimer_core::{Theme, TimerStatus};

fn status_label(status: TimerStatus) -> &'static str {
    match status {
        TimerStatus::Idle => "ready",
        TimerStatus::Running => "running",
        TimerStatus::Paused => "paused",
        TimerStatus::Completed => "done",
    }
}

pub fn print_rows(rows: &[TimerRow], theme: Theme) {
    if rows.is_empty() {
        println!("No timers yet. Add one with `cookietimer add <NAME> <MINUTES>`.");
        return;
    }

    let palette = theme.palette();
    let name_width = rows
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    let header = format!(
        "{:>4}  {:<name_width$}  {:>8}  {:<8}  {}",
        "ID", "NAME", "TIME", "STATUS", "TEMP"
    );
    println!("{}", header.color(palette.accent).bold());
    for row in rows {
        let line = format!(
            "{:>4}  {:<name_width$}  {:>8}  {:<8}  {}",
            row.id,
            row.name,
            row.countdown,
            status_label(row.status),
            row.temperature.as_deref().unwrap_or("-"),
        );
        println!("{}", line.color(palette.for_status(row.status)));
    }
}

pub fn clear_screen() {
    print!("\x1b[2J\x1b[H");
}
