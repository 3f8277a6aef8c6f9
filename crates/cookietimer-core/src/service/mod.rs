//! Background timer service.
//!
//! The persisted timer list is authoritative. The service keeps one
//! [`Countdown`] per running record and rebuilds that set every time the
//! list changes. Countdowns report ticks back to the loop, which persists
//! them and runs the completion sequence when a timer reaches zero:
//!
//! 1. completion notification
//! 2. vibration
//! 3. alarm sound (awaited)
//! 4. mark the record completed
//!
//! A countdown owns its record only while the record still carries the
//! [`Anchor`] the countdown started from or last wrote. If a start or reset
//! from another process moves the anchor, the countdown is replaced, and its
//! pending writes and alerts are dropped.
//!
//! Commands arrive through a [`ServiceHandle`] in-process, or through the
//! `service_commands` table from other processes.

pub mod alerts;
mod command;
pub mod countdown;
pub mod reconcile;

pub use alerts::{Alerts, DesktopAlerts, VIBRATION_PATTERN};
pub use command::ServiceCommand;
pub use countdown::{Countdown, CountdownMsg};
pub use reconcile::{plan, ReconcilePlan};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::storage::{ServiceConfig, TimerRepository};
use crate::timer::{Anchor, Timer, TimerId};

/// Why [`TimerService::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A `stop-service` command was received.
    Stopped,
    /// A timer finished and nothing else is running.
    Idle,
    /// Ctrl-C.
    Interrupted,
}

/// Sends commands to a running [`TimerService`].
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ServiceCommand>,
}

impl ServiceHandle {
    pub fn send(&self, command: ServiceCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| CoreError::Background("timer service is not running".into()))
    }

    pub fn start_timer(&self, id: TimerId) -> Result<()> {
        self.send(ServiceCommand::StartTimer(id))
    }

    pub fn stop_timer(&self, id: TimerId) -> Result<()> {
        self.send(ServiceCommand::StopTimer(id))
    }

    pub fn reset_timer(&self, id: TimerId) -> Result<()> {
        self.send(ServiceCommand::ResetTimer(id))
    }

    pub fn stop_service(&self) -> Result<()> {
        self.send(ServiceCommand::StopService)
    }
}

/// A countdown owned by the service, with the anchor it expects the record
/// to carry. The anchor moves forward with every tick the service persists.
struct Slot {
    anchor: Anchor,
    stage: Stage,
}

enum Stage {
    Counting(Countdown),
    /// Alerts are playing; the record is marked completed when they end.
    Completing {
        generation: u64,
        task: JoinHandle<()>,
    },
}

impl Slot {
    fn generation(&self) -> u64 {
        match &self.stage {
            Stage::Counting(countdown) => countdown.generation,
            Stage::Completing { generation, .. } => *generation,
        }
    }

    fn cancel(self) {
        match self.stage {
            Stage::Counting(countdown) => countdown.cancel(),
            Stage::Completing { task, .. } => task.abort(),
        }
    }
}

/// Result of a completion task, reported back to the loop.
struct Completion {
    id: TimerId,
    generation: u64,
    outcome: Result<bool>,
}

enum Flow {
    Continue,
    /// A timer reached the completed state.
    Completed,
    Exit(ExitReason),
}

/// Loop state. Receivers live on the stack of [`TimerService::run`].
struct Worker {
    repo: TimerRepository,
    alerts: Arc<dyn Alerts>,
    config: ServiceConfig,
    slots: HashMap<TimerId, Slot>,
    next_generation: u64,
    last_running: Option<usize>,
    ticks: mpsc::UnboundedSender<CountdownMsg>,
    completions: mpsc::UnboundedSender<Completion>,
}

pub struct TimerService {
    worker: Worker,
    commands_tx: mpsc::UnboundedSender<ServiceCommand>,
    commands_rx: mpsc::UnboundedReceiver<ServiceCommand>,
    ticks_rx: mpsc::UnboundedReceiver<CountdownMsg>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl TimerService {
    pub fn new(repo: TimerRepository, alerts: Arc<dyn Alerts>, config: ServiceConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ticks, ticks_rx) = mpsc::unbounded_channel();
        let (completions, completions_rx) = mpsc::unbounded_channel();
        Self {
            worker: Worker {
                repo,
                alerts,
                config,
                slots: HashMap::new(),
                next_generation: 0,
                last_running: None,
                ticks,
                completions,
            },
            commands_tx,
            commands_rx,
            ticks_rx,
            completions_rx,
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            tx: self.commands_tx.clone(),
        }
    }

    /// Run until stopped, idle or interrupted.
    ///
    /// # Errors
    ///
    /// Fails only if the initial load of the timer list fails. Later
    /// storage errors are logged and reported through [`Alerts::notify_error`].
    pub async fn run(self) -> Result<ExitReason> {
        let TimerService {
            mut worker,
            commands_tx,
            mut commands_rx,
            mut ticks_rx,
            mut completions_rx,
        } = self;
        // Commands may only come from handles created before `run`.
        drop(commands_tx);

        info!(
            tick_ms = worker.config.tick_interval_ms,
            poll_ms = worker.config.poll_interval_ms,
            "timer service starting"
        );

        let mut changes = worker.repo.subscribe();
        worker.repo.refresh().await?;
        let initial = changes.borrow_and_update().clone();
        let flow = worker.reconcile(&initial).await;
        if let Some(reason) = worker.exit_reason(flow).await {
            worker.shutdown().await;
            return Ok(reason);
        }

        let mut poll = tokio::time::interval(worker.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut commands_open = true;

        let reason = 'run: loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break 'run ExitReason::Stopped;
                    }
                    let timers = changes.borrow_and_update().clone();
                    let flow = worker.reconcile(&timers).await;
                    if let Some(reason) = worker.exit_reason(flow).await {
                        break 'run reason;
                    }
                }
                Some(msg) = ticks_rx.recv() => {
                    let flow = worker.on_countdown(msg).await;
                    if let Some(reason) = worker.exit_reason(flow).await {
                        break 'run reason;
                    }
                }
                Some(done) = completions_rx.recv() => {
                    let flow = worker.on_completion(done).await;
                    if let Some(reason) = worker.exit_reason(flow).await {
                        break 'run reason;
                    }
                }
                command = commands_rx.recv(), if commands_open => match command {
                    Some(command) => {
                        let flow = worker.on_command(command).await;
                        if let Some(reason) = worker.exit_reason(flow).await {
                            break 'run reason;
                        }
                    }
                    None => commands_open = false,
                },
                _ = poll.tick() => {
                    if let Err(e) = worker.repo.poll_external().await {
                        worker.report("checking for external changes", e).await;
                    }
                    match worker.repo.drain_commands().await {
                        Ok(queued) => {
                            for command in queued {
                                let flow = worker.on_command(command).await;
                                if let Some(reason) = worker.exit_reason(flow).await {
                                    break 'run reason;
                                }
                            }
                        }
                        Err(e) => worker.report("reading queued commands", e).await,
                    }
                }
                _ = &mut ctrl_c => break 'run ExitReason::Interrupted,
            }
        };

        worker.shutdown().await;
        info!(?reason, "timer service stopped");
        Ok(reason)
    }
}

impl Worker {
    /// Align countdowns with `timers`.
    async fn reconcile(&mut self, timers: &[Timer]) -> Flow {
        let active: HashMap<TimerId, Anchor> = self
            .slots
            .iter()
            .map(|(id, slot)| (*id, slot.anchor))
            .collect();
        let plan = reconcile::plan(&active, timers, Utc::now());
        if !plan.is_empty() {
            debug!(
                cancel = ?plan.cancel,
                start = ?plan.start,
                complete = plan.complete.len(),
                "reconciling countdowns"
            );
        }

        let mut flow = Flow::Continue;
        for id in &plan.cancel {
            match self.slots.remove(id) {
                // The completion write landed before its report reached us.
                Some(Slot {
                    stage: Stage::Completing { .. },
                    ..
                }) if timers.iter().any(|t| t.id == *id && t.is_completed) => {
                    flow = Flow::Completed;
                }
                Some(slot) => slot.cancel(),
                None => {}
            }
        }
        for &(id, remaining) in &plan.start {
            if let Some(anchor) = timers.iter().find(|t| t.id == id).and_then(Timer::anchor) {
                self.start_countdown(id, anchor, remaining);
            }
        }

        for timer in &plan.complete {
            let Some(anchor) = timer.anchor() else {
                continue;
            };
            match self.repo.mark_completed(timer.id, anchor).await {
                Ok(true) => {
                    info!(id = timer.id, "timer ran out while the service was down");
                    self.alerts.notify_completed(timer).await;
                    flow = Flow::Completed;
                }
                Ok(false) => {}
                Err(e) => self.report("completing an elapsed timer", e).await,
            }
        }

        self.update_running(plan.running_count).await;
        flow
    }

    /// Reload from storage and reconcile against what is actually there.
    async fn resync(&mut self) -> Flow {
        if let Err(e) = self.repo.refresh().await {
            self.report("reloading timers", e).await;
            return Flow::Continue;
        }
        let timers = self.repo.snapshot();
        self.reconcile(&timers).await
    }

    fn start_countdown(&mut self, id: TimerId, anchor: Anchor, remaining: u32) {
        self.next_generation += 1;
        let generation = self.next_generation;
        debug!(id, generation, remaining, "countdown started");
        let countdown = Countdown::spawn(
            id,
            generation,
            remaining,
            self.config.tick_interval(),
            self.ticks.clone(),
        );
        let slot = Slot {
            anchor,
            stage: Stage::Counting(countdown),
        };
        if let Some(old) = self.slots.insert(id, slot) {
            old.cancel();
        }
    }

    fn is_current(&self, id: TimerId, generation: u64) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| slot.generation() == generation)
    }

    async fn on_countdown(&mut self, msg: CountdownMsg) -> Flow {
        let anchor = match self.slots.get(&msg.id()) {
            Some(Slot {
                anchor,
                stage: Stage::Counting(c),
            }) if c.generation == msg.generation() => *anchor,
            _ => {
                warn!(id = msg.id(), generation = msg.generation(), "dropping stale countdown message");
                return Flow::Continue;
            }
        };

        match msg {
            CountdownMsg::Tick { id, remaining, .. } => {
                let at = Utc::now();
                match self.repo.record_tick(id, anchor, remaining, at).await {
                    Ok(true) => {
                        if let Some(slot) = self.slots.get_mut(&id) {
                            slot.anchor = Anchor {
                                started_at: at,
                                remaining_secs: remaining,
                            };
                        }
                        Flow::Continue
                    }
                    Ok(false) => {
                        debug!(id, "timer changed elsewhere, resyncing");
                        self.resync().await
                    }
                    Err(e) => {
                        self.report("saving timer progress", e).await;
                        Flow::Continue
                    }
                }
            }
            CountdownMsg::Finished { id, generation } => {
                let timer = match self.repo.get(id).await {
                    Ok(Some(timer)) if timer.anchor() == Some(anchor) => timer,
                    Ok(_) => {
                        // Stopped, reset or restarted before it ran out.
                        debug!(id, "finished countdown no longer owns its timer");
                        self.cancel(id);
                        return self.resync().await;
                    }
                    Err(e) => {
                        self.slots.remove(&id);
                        self.report("loading a finished timer", e).await;
                        return Flow::Continue;
                    }
                };
                let task = self.spawn_completion(timer, anchor, generation);
                // Replacing the stage drops the finished countdown.
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.stage = Stage::Completing { generation, task };
                }
                Flow::Continue
            }
        }
    }

    fn spawn_completion(&self, timer: Timer, anchor: Anchor, generation: u64) -> JoinHandle<()> {
        let alerts = Arc::clone(&self.alerts);
        let repo = self.repo.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            alerts.notify_completed(&timer).await;
            alerts.vibrate().await;
            alerts.play_sound().await;
            let outcome = repo.mark_completed(timer.id, anchor).await;
            let _ = completions.send(Completion {
                id: timer.id,
                generation,
                outcome,
            });
        })
    }

    async fn on_completion(&mut self, done: Completion) -> Flow {
        let current = self.is_current(done.id, done.generation);
        if current {
            self.slots.remove(&done.id);
        }
        match done.outcome {
            Ok(true) if current => Flow::Completed,
            Ok(_) => Flow::Continue,
            Err(e) => {
                self.report("marking a timer completed", e).await;
                Flow::Continue
            }
        }
    }

    async fn on_command(&mut self, command: ServiceCommand) -> Flow {
        debug!(%command, "service command");
        let now = Utc::now();
        let result = match command {
            ServiceCommand::StartService => return self.resync().await,
            ServiceCommand::StopService => return Flow::Exit(ExitReason::Stopped),
            ServiceCommand::StartTimer(id) => self.repo.start(id, now).await,
            ServiceCommand::StopTimer(id) => {
                self.cancel(id);
                self.repo.stop(id, now).await
            }
            ServiceCommand::ResetTimer(id) => {
                self.cancel(id);
                self.repo.reset(id, now).await
            }
        };

        match result {
            Ok(None) => {
                if let Some(id) = command.timer_id() {
                    warn!(id, "{command} ignored: no such timer");
                }
            }
            Ok(Some(transition)) => {
                if let Some(event) = transition.event {
                    info!(?event, "timer updated");
                }
            }
            Err(e) => self.report(&format!("handling {command}"), e).await,
        }
        Flow::Continue
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(slot) = self.slots.remove(&id) {
            debug!(id, "countdown cancelled");
            slot.cancel();
        }
    }

    async fn update_running(&mut self, count: usize) {
        if self.last_running == Some(count) {
            return;
        }
        self.last_running = Some(count);
        self.alerts.notify_running(count).await;
    }

    /// Map a handler outcome to a reason to stop, if any.
    async fn exit_reason(&self, flow: Flow) -> Option<ExitReason> {
        match flow {
            Flow::Exit(reason) => Some(reason),
            Flow::Completed => self.should_exit_idle().await.then_some(ExitReason::Idle),
            Flow::Continue => None,
        }
    }

    async fn should_exit_idle(&self) -> bool {
        if !self.config.exit_when_idle || !self.slots.is_empty() {
            return false;
        }
        matches!(self.repo.count_running().await, Ok(0))
    }

    async fn report(&self, context: &str, err: CoreError) {
        error!("{context}: {err}");
        self.alerts.notify_error(&format!("{context}: {err}")).await;
    }

    async fn shutdown(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.cancel();
        }
        self.update_running(0).await;
    }
}
