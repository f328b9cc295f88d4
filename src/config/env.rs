//! Environment variable parsing helpers.

use std::env;

pub(crate) const ENV_SERVER_URL: &str = "LIVE_SERVER_URL";
pub(crate) const ENV_CONNECT_TIMEOUT_SECONDS: &str = "LIVE_CONNECT_TIMEOUT_SECONDS";
pub(crate) const ENV_RESPONSE_MODALITY: &str = "LIVE_RESPONSE_MODALITY";
pub(crate) const ENV_INPUT_TRANSCRIPTION: &str = "LIVE_INPUT_TRANSCRIPTION";
pub(crate) const ENV_OUTPUT_TRANSCRIPTION: &str = "LIVE_OUTPUT_TRANSCRIPTION";

/// Read a variable, treating unset and blank values alike.
pub(crate) fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_u64(name: &str) -> Result<Option<u64>, String> {
    env_string(name)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|e| format!("Invalid value for {name}: {v} ({e})"))
        })
        .transpose()
}

pub(crate) fn env_bool(name: &str) -> Result<Option<bool>, String> {
    env_string(name)
        .map(|v| parse_bool(&v).ok_or_else(|| format!("Invalid boolean for {name}: {v}")))
        .transpose()
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
