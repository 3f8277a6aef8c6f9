//! Per-timer countdown tasks.
//!
//! A countdown never touches storage. It samples a monotonic deadline every
//! tick and reports to the service loop over a channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::timer::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownMsg {
    /// The visible remaining seconds changed.
    Tick {
        id: TimerId,
        generation: u64,
        remaining: u32,
    },
    Finished { id: TimerId, generation: u64 },
}

impl CountdownMsg {
    pub fn id(&self) -> TimerId {
        match self {
            CountdownMsg::Tick { id, .. } | CountdownMsg::Finished { id, .. } => *id,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            CountdownMsg::Tick { generation, .. } | CountdownMsg::Finished { generation, .. } => {
                *generation
            }
        }
    }
}

/// Handle to a running countdown. Dropping it aborts the task.
#[derive(Debug)]
pub struct Countdown {
    pub generation: u64,
    handle: JoinHandle<()>,
}

impl Countdown {
    pub fn spawn(
        id: TimerId,
        generation: u64,
        remaining: u32,
        tick: Duration,
        tx: mpsc::UnboundedSender<CountdownMsg>,
    ) -> Self {
        let handle = tokio::spawn(run(id, generation, remaining, tick, tx));
        Self { generation, handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Whole seconds left before `deadline`, rounded up.
fn visible_secs(deadline: Instant, now: Instant) -> u32 {
    let left = deadline.saturating_duration_since(now);
    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
    secs.min(u64::from(u32::MAX)) as u32
}

async fn run(
    id: TimerId,
    generation: u64,
    remaining: u32,
    tick: Duration,
    tx: mpsc::UnboundedSender<CountdownMsg>,
) {
    let deadline = Instant::now() + Duration::from_secs(u64::from(remaining));
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = remaining;

    loop {
        interval.tick().await;
        let visible = visible_secs(deadline, Instant::now());
        if visible == 0 {
            let _ = tx.send(CountdownMsg::Finished { id, generation });
            return;
        }
        if visible != last {
            last = visible;
            if tx
                .send(CountdownMsg::Tick {
                    id,
                    generation,
                    remaining: visible,
                })
                .is_err()
            {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_secs_rounds_up() {
        let now = Instant::now();
        assert_eq!(visible_secs(now + Duration::from_millis(1), now), 1);
        assert_eq!(visible_secs(now + Duration::from_millis(1000), now), 1);
        assert_eq!(visible_secs(now + Duration::from_millis(1001), now), 2);
        assert_eq!(visible_secs(now, now + Duration::from_secs(3)), 0);
    }

    #[tokio::test]
    async fn counts_down_then_finishes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _countdown = Countdown::spawn(7, 3, 2, Duration::from_millis(50), tx);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            CountdownMsg::Tick {
                id: 7,
                generation: 3,
                remaining: 1
            }
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(second, CountdownMsg::Finished { id: 7, generation: 3 });
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let countdown = Countdown::spawn(1, 1, 60, Duration::from_millis(10), tx);
        countdown.cancel();
        // The aborted task drops its sender, closing the channel.
        assert!(rx.recv().await.is_none());
    }
}
