//! User-facing alerts: notifications, haptics and the alarm sound.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use notify_rust::{Notification, Timeout};

use crate::storage::NotificationsConfig;
use crate::timer::Timer;

/// Vibration pattern in milliseconds: wait, buzz, wait, buzz.
pub const VIBRATION_PATTERN: [u64; 4] = [0, 500, 200, 500];

const APP_NAME: &str = "Cookie Timer";

#[async_trait]
pub trait Alerts: Send + Sync {
    /// Per-timer "time is up" notification.
    async fn notify_completed(&self, timer: &Timer);
    /// The shared notification showing how many timers are counting down.
    async fn notify_running(&self, count: usize);
    async fn notify_error(&self, message: &str);
    async fn vibrate(&self);
    /// Play the alarm and return once it has finished.
    async fn play_sound(&self);
}

/// Desktop implementation backed by `notify-rust`.
pub struct DesktopAlerts {
    prefs: NotificationsConfig,
}

impl DesktopAlerts {
    pub fn new(prefs: NotificationsConfig) -> Self {
        Self { prefs }
    }

    async fn show(&self, summary: String, body: String, timeout: Timeout) {
        if !self.prefs.enabled {
            return;
        }
        let shown = tokio::task::spawn_blocking(move || {
            Notification::new()
                .appname(APP_NAME)
                .summary(&summary)
                .body(&body)
                .timeout(timeout)
                .show()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await;
        match shown {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("failed to show notification: {e}"),
            Err(e) => tracing::warn!("notification task failed: {e}"),
        }
    }
}

fn ring_bell() {
    let mut err = std::io::stderr();
    let _ = err.write_all(b"\x07");
    let _ = err.flush();
}

#[async_trait]
impl Alerts for DesktopAlerts {
    async fn notify_completed(&self, timer: &Timer) {
        tracing::info!(id = timer.id, name = %timer.name, "timer finished");
        self.show(
            format!("{} is ready!", timer.name),
            "Your timer has finished.".into(),
            Timeout::Milliseconds(10_000),
        )
        .await;
    }

    async fn notify_running(&self, count: usize) {
        tracing::info!(count, "timers running");
        if !self.prefs.running_summary || count == 0 {
            return;
        }
        let body = match count {
            1 => "1 timer running".to_string(),
            n => format!("{n} timers running"),
        };
        self.show(APP_NAME.into(), body, Timeout::Milliseconds(5000))
            .await;
    }

    async fn notify_error(&self, message: &str) {
        self.show(
            format!("{APP_NAME}: something went wrong"),
            message.to_string(),
            Timeout::Milliseconds(5000),
        )
        .await;
    }

    async fn vibrate(&self) {
        if !self.prefs.vibration {
            return;
        }
        // No haptics on the desktop; pulse the bell instead.
        for (i, ms) in VIBRATION_PATTERN.iter().enumerate() {
            if i % 2 == 1 {
                ring_bell();
            }
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
    }

    async fn play_sound(&self) {
        if !self.prefs.sound {
            return;
        }
        let Some((program, args)) = self.prefs.sound_command() else {
            ring_bell();
            return;
        };
        let status = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => {}
            Ok(s) => tracing::warn!(%program, "alarm command exited with {s}"),
            Err(e) => {
                tracing::warn!(%program, "failed to run alarm command: {e}");
                ring_bell();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_alternates_wait_and_buzz() {
        assert_eq!(VIBRATION_PATTERN.len() % 2, 0);
        assert_eq!(VIBRATION_PATTERN[0], 0);
        assert_eq!(VIBRATION_PATTERN.iter().sum::<u64>(), 1200);
    }

    #[tokio::test]
    async fn disabled_preferences_skip_all_output() {
        let alerts = DesktopAlerts::new(NotificationsConfig {
            enabled: false,
            vibration: false,
            sound: false,
            sound_command: None,
            running_summary: false,
        });
        let started = std::time::Instant::now();
        alerts.vibrate().await;
        alerts.play_sound().await;
        alerts.notify_running(3).await;
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sound_command_is_awaited() {
        let alerts = DesktopAlerts::new(NotificationsConfig {
            enabled: false,
            vibration: false,
            sound: true,
            sound_command: Some("sleep 0.3".into()),
            running_summary: false,
        });
        let started = std::time::Instant::now();
        alerts.play_sound().await;
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
