use std::fmt;

use crate::timer::TimerId;

/// Internal control messages for the timer service.
///
/// Delivered in-process through [`super::ServiceHandle`] or, from another
/// process, through the `service_commands` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    StartService,
    StopService,
    StartTimer(TimerId),
    StopTimer(TimerId),
    ResetTimer(TimerId),
}

impl ServiceCommand {
    pub fn action(&self) -> &'static str {
        match self {
            ServiceCommand::StartService => "start-service",
            ServiceCommand::StopService => "stop-service",
            ServiceCommand::StartTimer(_) => "start-timer",
            ServiceCommand::StopTimer(_) => "stop-timer",
            ServiceCommand::ResetTimer(_) => "reset-timer",
        }
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        match self {
            ServiceCommand::StartTimer(id)
            | ServiceCommand::StopTimer(id)
            | ServiceCommand::ResetTimer(id) => Some(*id),
            ServiceCommand::StartService | ServiceCommand::StopService => None,
        }
    }

    /// Rebuild a command from its stored form.
    ///
    /// Timer actions without an id are rejected, as are unknown actions.
    pub fn from_parts(action: &str, timer_id: Option<TimerId>) -> Option<Self> {
        match (action, timer_id) {
            ("start-service", _) => Some(ServiceCommand::StartService),
            ("stop-service", _) => Some(ServiceCommand::StopService),
            ("start-timer", Some(id)) => Some(ServiceCommand::StartTimer(id)),
            ("stop-timer", Some(id)) => Some(ServiceCommand::StopTimer(id)),
            ("reset-timer", Some(id)) => Some(ServiceCommand::ResetTimer(id)),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timer_id() {
            Some(id) => write!(f, "{} {id}", self.action()),
            None => f.write_str(self.action()),
        }
    }
}
