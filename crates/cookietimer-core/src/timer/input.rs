//! Validation of user input for new timers.
//!
//! Everything here runs before any state is touched: a rejected input never
//! reaches the store.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::units::TemperatureUnit;

/// A validated request to create a timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTimer {
    pub name: String,
    pub duration_secs: u32,
    pub temperature_celsius: Option<f64>,
    /// Unit the temperature was typed in. Only meaningful with a temperature.
    pub input_unit: TemperatureUnit,
}

impl NewTimer {
    /// Validate the raw fields of the add dialog.
    ///
    /// `duration` is in whole minutes, `temperature` may be empty.
    pub fn parse(
        name: &str,
        duration: &str,
        temperature: Option<&str>,
        unit: TemperatureUnit,
    ) -> Result<Self, ValidationError> {
        let name = validate_name(name)?;
        let duration_secs = parse_duration_minutes(duration)?;
        let temperature_celsius = match temperature {
            Some(raw) => parse_temperature(raw, unit)?,
            None => None,
        };
        Ok(Self {
            name,
            duration_secs,
            temperature_celsius,
            input_unit: unit,
        })
    }
}

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

/// Parse a whole number of minutes and return the duration in seconds.
pub fn parse_duration_minutes(input: &str) -> Result<u32, ValidationError> {
    let trimmed = input.trim();
    let minutes: i64 = trimmed.parse().map_err(|_| ValidationError::NotANumber {
        field: "duration",
        input: trimmed.to_string(),
    })?;
    if minutes <= 0 {
        return Err(ValidationError::NonPositiveDuration(minutes));
    }
    minutes
        .checked_mul(60)
        .and_then(|secs| u32::try_from(secs).ok())
        .ok_or(ValidationError::DurationTooLong(minutes))
}

/// Parse an optional oven temperature given in `unit`, returning Celsius.
pub fn parse_temperature(
    input: &str,
    unit: TemperatureUnit,
) -> Result<Option<f64>, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: f64 = trimmed
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| ValidationError::NotANumber {
            field: "temperature",
            input: trimmed.to_string(),
        })?;
    Ok(Some(unit.to_celsius(value)))
}
