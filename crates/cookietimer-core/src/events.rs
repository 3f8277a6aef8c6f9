use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::TimerId;

/// Every state change of a timer record produces an Event.
/// Front ends and the service log them at debug and info level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerAdded {
        id: TimerId,
        name: String,
        duration_secs: u32,
        at: DateTime<Utc>,
    },
    TimerStarted {
        id: TimerId,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerStopped {
        id: TimerId,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerReset {
        id: TimerId,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerCompleted {
        id: TimerId,
        at: DateTime<Utc>,
    },
    TimerDeleted {
        id: TimerId,
        undo_until: DateTime<Utc>,
    },
    TimerRestored {
        id: TimerId,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn timer_id(&self) -> TimerId {
        match self {
            Event::TimerAdded { id, .. }
            | Event::TimerStarted { id, .. }
            | Event::TimerStopped { id, .. }
            | Event::TimerReset { id, .. }
            | Event::TimerCompleted { id, .. }
            | Event::TimerDeleted { id, .. }
            | Event::TimerRestored { id, .. } => *id,
        }
    }
}
