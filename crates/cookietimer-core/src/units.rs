//! Oven temperature units.
//!
//! Temperatures are always stored in Celsius. Conversion happens at the
//! edges: when the user types a temperature and when a row is rendered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    GasMark,
}

/// Upper bounds (exclusive, Celsius) for each gas mark.
const GAS_MARKS: [(f64, f64); 10] = [
    (135.0, 0.25),
    (150.0, 1.0),
    (165.0, 2.0),
    (175.0, 3.0),
    (190.0, 4.0),
    (200.0, 5.0),
    (220.0, 6.0),
    (230.0, 7.0),
    (240.0, 8.0),
    (260.0, 9.0),
];

/// Representative oven temperature for each gas mark, used when the user
/// enters a mark instead of degrees.
const GAS_MARK_CELSIUS: [(f64, f64); 11] = [
    (0.25, 110.0),
    (1.0, 140.0),
    (2.0, 150.0),
    (3.0, 170.0),
    (4.0, 180.0),
    (5.0, 190.0),
    (6.0, 200.0),
    (7.0, 220.0),
    (8.0, 230.0),
    (9.0, 240.0),
    (10.0, 260.0),
];

impl TemperatureUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
            TemperatureUnit::GasMark => "gas_mark",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
            TemperatureUnit::GasMark => "GM",
        }
    }

    /// Convert a Celsius value into this unit.
    pub fn from_celsius(&self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
            TemperatureUnit::GasMark => celsius_to_gas_mark(celsius),
        }
    }

    /// Convert a value expressed in this unit into Celsius.
    pub fn to_celsius(&self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            TemperatureUnit::GasMark => gas_mark_to_celsius(value),
        }
    }

    /// Human-readable temperature, e.g. `180°C`, `356°F` or `GM 4`.
    pub fn display(&self, celsius: f64) -> String {
        let value = self.from_celsius(celsius);
        match self {
            TemperatureUnit::GasMark if value < 1.0 => "GM 1/4".to_string(),
            TemperatureUnit::GasMark => format!("GM {}", value as i64),
            _ => format!("{}°{}", value.round() as i64, self.symbol()),
        }
    }
}

fn celsius_to_gas_mark(celsius: f64) -> f64 {
    GAS_MARKS
        .iter()
        .find(|(upper, _)| celsius < *upper)
        .map(|(_, mark)| *mark)
        .unwrap_or(10.0)
}

fn gas_mark_to_celsius(mark: f64) -> f64 {
    // Nearest listed mark wins.
    GAS_MARK_CELSIUS
        .iter()
        .min_by(|a, b| (a.0 - mark).abs().total_cmp(&(b.0 - mark).abs()))
        .map(|(_, c)| *c)
        .unwrap_or(180.0)
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemperatureUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "celsius" => Ok(TemperatureUnit::Celsius),
            "f" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            "gm" | "gas" | "gas_mark" | "gas-mark" | "gasmark" => Ok(TemperatureUnit::GasMark),
            other => Err(ValidationError::UnknownUnit(other.to_string())),
        }
    }
}
