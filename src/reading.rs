use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// One ingested power measurement. Constructed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub device_id: String,
    pub power_kw: f64,
    /// Stamped at receipt; the sensor has no trustworthy clock of its own.
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, power_kw: f64) -> Self {
        Self {
            device_id: device_id.into(),
            power_kw,
            observed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("payload is not a finite number")]
    NotANumber,
    #[error("power {value} kW outside plausible range 0..={max} kW")]
    OutOfRange { value: f64, max: f64 },
}

/// Decode a raw feed payload as one decimal kilowatt value.
///
/// The payload must be a UTF-8 decimal string; surrounding whitespace is
/// tolerated (sensor firmware tends to newline-terminate), trailing junk is
/// not. Values that are negative or above `max_power_kw` are rejected as
/// sensor glitches.
pub fn parse_power(payload: &[u8], max_power_kw: f64) -> Result<f64, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotANumber)?;

    let value: f64 = text.trim().parse().map_err(|_| ParseError::NotANumber)?;

    // f64::from_str happily produces "NaN" and "inf"
    if !value.is_finite() {
        return Err(ParseError::NotANumber);
    }

    if value < 0.0 || value > max_power_kw {
        return Err(ParseError::OutOfRange {
            value,
            max: max_power_kw,
        });
    }

    Ok(value)
}
