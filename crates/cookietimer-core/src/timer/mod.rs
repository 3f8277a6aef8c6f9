mod input;
mod record;

pub use input::{parse_duration_minutes, parse_temperature, validate_name, NewTimer};
pub use record::{Anchor, Timer, TimerId, TimerStatus};
