//! Line parser for the coordinator's `key=value` telemetry lines.
//!
//! ```text
//! A1,ms=1000,tempC=24.5,mq2=100,flame=0,gas=clean,light=200
//! ^^ address tag (ignored)
//! ```
//!
//! Tokens without `=` are skipped. `tempC`, `mq2` and `flame` are required;
//! everything else is best-effort.

use crate::domain::Reading;
use std::collections::HashMap;
use thiserror::Error;

pub const KEY_TIMESTAMP: &str = "ms";
pub const KEY_TEMPERATURE: &str = "tempC";
pub const KEY_GAS: &str = "mq2";
pub const KEY_FLAME: &str = "flame";
pub const KEY_GAS_LABEL: &str = "gas";
pub const KEY_LIGHT_LABEL: &str = "light";

/// Why a line did not produce a [`Reading`].
///
/// A rejection is never fatal: the caller keeps whatever reading it had.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineRejected {
    #[error("empty line")]
    Empty,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a usable number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Parse one line into a [`Reading`].
pub fn parse_line(line: &str) -> Result<Reading, LineRejected> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LineRejected::Empty);
    }

    // later duplicates win
    let fields: HashMap<&str, &str> = line
        .split(',')
        .skip(1)
        .filter_map(|token| token.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let temperature = required(&fields, KEY_TEMPERATURE)?;
    let gas = required(&fields, KEY_GAS)?;
    let flame = required(&fields, KEY_FLAME)?;

    Ok(Reading {
        timestamp_ms: fields
            .get(KEY_TIMESTAMP)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        temperature_c: parse_temperature(temperature)?,
        gas_level: parse_truncated(KEY_GAS, gas)?,
        flame_raw: parse_truncated(KEY_FLAME, flame)?,
        gas_label: label(&fields, KEY_GAS_LABEL),
        light_label: label(&fields, KEY_LIGHT_LABEL),
    })
}

fn required<'a>(
    fields: &HashMap<&str, &'a str>,
    key: &'static str,
) -> Result<&'a str, LineRejected> {
    fields
        .get(key)
        .copied()
        .ok_or(LineRejected::MissingField(key))
}

fn invalid(field: &'static str, value: &str) -> LineRejected {
    LineRejected::InvalidNumber {
        field,
        value: value.to_string(),
    }
}

/// A failed temperature sensor reports `nan`; the line still carries the
/// flame and gas values, so it is kept.
fn parse_temperature(value: &str) -> Result<f64, LineRejected> {
    value
        .parse::<f64>()
        .map_err(|_| invalid(KEY_TEMPERATURE, value))
}

/// Sensors sometimes print `312.0`; accept it and drop the fraction.
/// Non-finite counts have no integer value and reject the line.
fn parse_truncated(field: &'static str, value: &str) -> Result<i64, LineRejected> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
        .ok_or_else(|| invalid(field, value))
}

fn label(fields: &HashMap<&str, &str>, key: &str) -> String {
    fields.get(key).map(|v| v.to_string()).unwrap_or_default()
}
