use std::io::Write;
use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use cookietimer_core::storage::Database;
use cookietimer_core::view::{self, format_time, TimerRow};
use cookietimer_core::{Config, CoreError, NewTimer, TemperatureUnit, TimerId, TimerRepository};

use super::CmdResult;
use crate::render;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Add a new timer
    Add {
        /// Timer name
        name: String,
        /// Duration in whole minutes
        #[arg(allow_hyphen_values = true)]
        minutes: String,
        /// Oven temperature
        #[arg(long, allow_hyphen_values = true)]
        temp: Option<String>,
        /// Unit of --temp (defaults to display.temperature_unit)
        #[arg(long)]
        unit: Option<TemperatureUnit>,
    },
    /// List all timers, newest first
    List {
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a live list until Ctrl-C
    Watch,
    /// Start or resume a timer
    Start { id: TimerId },
    /// Stop a timer, keeping its remaining time
    Stop { id: TimerId },
    /// Reset a timer to its full duration
    Reset { id: TimerId },
    /// Delete a timer (can be undone for a short while)
    Delete {
        id: TimerId,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Restore the last deleted timer
    Undo,
}

pub fn run(action: TimerAction) -> CmdResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let now = Utc::now();
    let unit = config.display.temperature_unit;

    match action {
        TimerAction::Add {
            name,
            minutes,
            temp,
            unit: input_unit,
        } => {
            let draft = NewTimer::parse(
                &name,
                &minutes,
                temp.as_deref(),
                input_unit.unwrap_or(unit),
            )?;
            let (timer, event) = db.add_timer(draft, now)?;
            tracing::debug!(?event, "timer added");
            let row = TimerRow::from_timer(&timer, unit, now);
            match row.temperature {
                Some(temp) => println!(
                    "Added timer {}: {} ({}, {temp})",
                    row.id, row.name, row.countdown
                ),
                None => println!("Added timer {}: {} ({})", row.id, row.name, row.countdown),
            }
        }
        TimerAction::List { json } => {
            let rows = view::rows(&db.list_timers()?, unit, now);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                render::print_rows(&rows, config.display.theme);
            }
        }
        TimerAction::Start { id } => {
            let transition = db.start_timer(id, now)?.ok_or(CoreError::TimerNotFound(id))?;
            tracing::debug!(event = ?transition.event, "start");
            let timer = transition.timer;
            println!(
                "Started {}: {} ({} left)",
                timer.id,
                timer.name,
                format_time(timer.remaining_secs)
            );
        }
        TimerAction::Stop { id } => {
            let transition = db.stop_timer(id, now)?.ok_or(CoreError::TimerNotFound(id))?;
            tracing::debug!(event = ?transition.event, "stop");
            let timer = transition.timer;
            if transition.event.is_some() {
                println!(
                    "Stopped {}: {} ({} left)",
                    timer.id,
                    timer.name,
                    format_time(timer.remaining_secs)
                );
            } else {
                println!("{} is not running", timer.name);
            }
        }
        TimerAction::Reset { id } => {
            let transition = db.reset_timer(id, now)?.ok_or(CoreError::TimerNotFound(id))?;
            tracing::debug!(event = ?transition.event, "reset");
            let timer = transition.timer;
            println!(
                "Reset {}: {} ({})",
                timer.id,
                timer.name,
                format_time(timer.remaining_secs)
            );
        }
        TimerAction::Delete { id, yes } => {
            let timer = db.get_timer(id)?.ok_or(CoreError::TimerNotFound(id))?;
            if !yes && !confirm(&format!("Delete '{}'?", timer.name))? {
                println!("Cancelled");
                return Ok(());
            }
            let window = config.ui.undo_window();
            let event = db
                .delete_with_undo(id, now, window)?
                .ok_or(CoreError::TimerNotFound(id))?;
            tracing::debug!(?event, "timer deleted");
            println!(
                "Deleted {}. Run `cookietimer undo` within {}s to restore it.",
                timer.name,
                window.num_seconds()
            );
        }
        TimerAction::Undo => match db.undo_delete(now, config.ui.undo_window())? {
            Some((timer, event)) => {
                tracing::debug!(?event, "timer restored");
                println!("Restored {}: {}", timer.id, timer.name);
            }
            None => println!("Nothing to undo"),
        },
        TimerAction::Watch => {
            drop(db);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(watch(&config))?;
        }
    }
    Ok(())
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` means no.
fn confirm(question: &str) -> Result<bool, std::io::Error> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn watch(config: &Config) -> CmdResult {
    let repo = TimerRepository::new(Database::open()?)?;
    let mut changes = repo.subscribe();
    let unit = config.display.temperature_unit;
    let theme = config.display.theme;

    let mut redraw = tokio::time::interval(Duration::from_millis(250));
    let mut poll = tokio::time::interval(config.service.poll_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut shown: Option<Vec<TimerRow>> = None;
    loop {
        tokio::select! {
            _ = redraw.tick() => {}
            _ = poll.tick() => {
                repo.poll_external().await?;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c => break,
        }

        let timers = changes.borrow_and_update().clone();
        let rows = view::rows(&timers, unit, Utc::now());
        let changed = match &shown {
            Some(previous) => !view::diff_rows(previous, &rows).is_empty(),
            None => true,
        };
        if changed {
            render::clear_screen();
            render::print_rows(&rows, theme);
            println!();
            println!("Ctrl-C to quit");
            std::io::stdout().flush()?;
            shown = Some(rows);
        }
    }
    Ok(())
}
