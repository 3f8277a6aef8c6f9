use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::timer::TimerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    OvenGlow,
}

/// Colour names understood by terminal renderers ("green", "bright red", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub running: &'static str,
    pub stopped: &'static str,
    pub completed: &'static str,
    pub accent: &'static str,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::OvenGlow => "oven_glow",
        }
    }

    pub fn palette(&self) -> Palette {
        match self {
            Theme::Light => Palette {
                running: "green",
                stopped: "blue",
                completed: "magenta",
                accent: "black",
            },
            Theme::Dark => Palette {
                running: "bright green",
                stopped: "bright cyan",
                completed: "bright magenta",
                accent: "white",
            },
            Theme::OvenGlow => Palette {
                running: "bright yellow",
                stopped: "yellow",
                completed: "bright red",
                accent: "red",
            },
        }
    }
}

impl Palette {
    pub fn for_status(&self, status: TimerStatus) -> &'static str {
        match status {
            TimerStatus::Running => self.running,
            TimerStatus::Completed => self.completed,
            TimerStatus::Idle | TimerStatus::Paused => self.stopped,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "oven_glow" | "oven" => Ok(Theme::OvenGlow),
            other => Err(ValidationError::UnknownTheme(other.to_string())),
        }
    }
}
