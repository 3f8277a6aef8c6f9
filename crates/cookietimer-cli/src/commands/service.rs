use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use cookietimer_core::storage::Database;
use cookietimer_core::{
    Config, DesktopAlerts, ExitReason, ServiceCommand, TimerRepository, TimerService,
};
use serde::{Deserialize, Serialize};

use super::CmdResult;

/// kv key holding the [`ServiceInfo`] of the running daemon.
const SERVICE_PID_KEY: &str = "service_pid";

#[derive(Subcommand)]
pub enum ServiceAction {
    /// Run the timer service in the foreground
    Run,
    /// Ask a running service to stop
    Stop,
    /// Show whether the service is running
    Status {
        /// Print status as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ServiceInfo {
    pid: u32,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ServiceStatus {
    running: bool,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    running_timers: usize,
    queued_commands: usize,
}

pub fn run(action: ServiceAction) -> CmdResult {
    match action {
        ServiceAction::Run => run_service(),
        ServiceAction::Stop => {
            let db = Database::open()?;
            if live_service(&db)?.is_none() {
                println!("service is not running");
                return Ok(());
            }
            db.enqueue_command(ServiceCommand::StopService)?;
            println!("stop requested");
            Ok(())
        }
        ServiceAction::Status { json } => {
            let db = Database::open()?;
            let info = live_service(&db)?;
            let status = ServiceStatus {
                running: info.is_some(),
                pid: info.as_ref().map(|i| i.pid),
                started_at: info.as_ref().map(|i| i.started_at),
                running_timers: db.count_running()?,
                queued_commands: db.pending_commands()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            match (status.pid, status.started_at) {
                (Some(pid), Some(since)) => println!(
                    "service: running (pid {pid}, since {})",
                    since.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                _ => println!("service: not running"),
            }
            println!("timers running: {}", status.running_timers);
            println!("queued commands: {}", status.queued_commands);
            Ok(())
        }
    }
}

fn run_service() -> CmdResult {
    let config = Config::load()?;
    let db = Database::open()?;
    if let Some(info) = live_service(&db)? {
        return Err(format!("service already running (pid {})", info.pid).into());
    }

    // Commands queued while no daemon was running are stale.
    let stale = db.drain_commands()?;
    if !stale.is_empty() {
        tracing::warn!(count = stale.len(), "discarding commands queued before start");
    }

    let info = ServiceInfo {
        pid: std::process::id(),
        started_at: Utc::now(),
    };
    db.kv_set(SERVICE_PID_KEY, &serde_json::to_string(&info)?)?;

    let repo = TimerRepository::new(db)?;
    let alerts = Arc::new(DesktopAlerts::new(config.notifications.clone()));
    let service = TimerService::new(repo, alerts, config.service.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(service.run());

    Database::open()?.kv_delete(SERVICE_PID_KEY)?;
    let reason = match outcome? {
        ExitReason::Stopped => "stop requested",
        ExitReason::Idle => "no timers running",
        ExitReason::Interrupted => "interrupted",
    };
    println!("service stopped ({reason})");
    Ok(())
}

/// The recorded daemon, if its process still exists.
fn live_service(db: &Database) -> Result<Option<ServiceInfo>, Box<dyn std::error::Error>> {
    let Some(json) = db.kv_get(SERVICE_PID_KEY)? else {
        return Ok(None);
    };
    let info: ServiceInfo = serde_json::from_str(&json)?;
    if process_alive(info.pid) {
        Ok(Some(info))
    } else {
        tracing::debug!(pid = info.pid, "clearing stale service entry");
        db.kv_delete(SERVICE_PID_KEY)?;
        Ok(None)
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    std::path::Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
