//! # Cookie Timer Core Library
//!
//! Core logic for Cookie Timer, a kitchen timer that keeps several named
//! countdowns (optionally with an oven temperature) alive in the background
//! and alerts when each one finishes. The `cookietimer` CLI is a thin layer
//! over this crate.
//!
//! ## Architecture
//!
//! - **Timer**: the persisted record and its state transitions
//! - **Storage**: SQLite timer store with change notification, TOML config
//! - **Service**: background loop that keeps one countdown per running
//!   timer and runs the completion alerts
//! - **View**: row model and diffing for list front ends
//!
//! ## Key Components
//!
//! - [`Timer`]: the timer record
//! - [`Database`]: synchronous persistence
//! - [`TimerRepository`]: async store that publishes every change
//! - [`TimerService`]: the background countdown service
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod service;
pub mod storage;
pub mod timer;
pub mod units;
pub mod view;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use service::{Alerts, DesktopAlerts, ExitReason, ServiceCommand, ServiceHandle, TimerService};
pub use storage::{Config, Database, TimerRepository};
pub use timer::{Anchor, NewTimer, Timer, TimerId, TimerStatus};
pub use units::TemperatureUnit;
pub use view::{format_time, Theme, TimerRow};
