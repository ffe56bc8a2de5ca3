use crate::AutomationError;
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse human-readable duration strings into milliseconds
/// Supports formats like: "1s", "500ms", "2m", "1.5s", "30"
pub fn parse_duration(input: &str) -> Result<u64, AutomationError> {
    let input = input.trim();

    // Plain numbers are milliseconds
    if let Ok(ms) = input.parse::<u64>() {
        return Ok(ms);
    }

    let (number_part, unit_part) = split_number_and_unit(input)?;
    let value: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| AutomationError::Config(format!("Invalid number in duration: {number_part}")))?;
    if value < 0.0 {
        return Err(AutomationError::Config(format!("Negative duration: {input}")));
    }

    let multiplier = match unit_part.trim() {
        "ms" | "milliseconds" | "millisecond" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "" => 1.0,
        other => {
            return Err(AutomationError::Config(format!("Unknown time unit: {other}")));
        }
    };

    Ok((value * multiplier) as u64)
}

fn split_number_and_unit(input: &str) -> Result<(&str, &str), AutomationError> {
    let split_pos = input
        .char_indices()
        .find(|(_, ch)| ch.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(input.len());

    let number_part = &input[..split_pos];
    if number_part.trim().is_empty() {
        return Err(AutomationError::Config(format!(
            "No numeric value in duration: {input}"
        )));
    }

    Ok((number_part, &input[split_pos..]))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Millis(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
        match self {
            RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
            RawDuration::Text(text) => parse_duration(&text)
                .map(Duration::from_millis)
                .map_err(E::custom),
        }
    }
}

/// Serde adapter: integers are milliseconds, strings use [`parse_duration`].
pub mod serde_ms {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?.into_duration()
    }
}

/// Same as [`serde_ms`] for optional fields.
pub mod serde_ms_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(RawDuration::into_duration)
            .transpose()
    }
}
