use std::time::Duration;

use crate::loader::error::ConfigLoadError;

pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

pub fn parse_csv_var(name: &str) -> Option<Vec<String>> {
    env_var(name).map(|raw| parse_csv(&raw))
}

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`, `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_bool_var(name: &str) -> Option<bool> {
    env_var(name).and_then(|raw| parse_bool(&raw))
}

/// Non-blank environment value.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn parse_number_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|raw| raw.trim().parse().ok())
}

/// Humantime duration such as `"15m"` or `"1h 30m"`.
pub fn parse_duration(field: &'static str, raw: &str) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(raw.trim()).map_err(|source| ConfigLoadError::InvalidDuration {
        field,
        value: raw.to_string(),
        source,
    })
}
