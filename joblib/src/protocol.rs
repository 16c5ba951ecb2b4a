//! Parsing of the worker's line protocol.
//!
//! Workers print one JSON object per line, e.g. `{"status": "Fetching OSM data", "progress": 20}`.
//! Anything else on stdout is kept as a plain informational line.

use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogLine {
    /// A structured line. Either field may be absent.
    Structured {
        status: Option<String>,
        progress: Option<u8>,
    },
    /// A line that is not a JSON object.
    Raw(String),
}

#[derive(Deserialize)]
struct Wire {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<Value>,
}

pub fn parse_line(line: &str) -> LogLine {
    let trimmed = line.trim();
    let wire = match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => serde_json::from_value::<Wire>(value),
        Ok(_) => return LogLine::Raw(trimmed.to_string()),
        Err(err) => Err(err),
    };
    match wire {
        Ok(wire) => LogLine::Structured {
            status: wire
                .status
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            progress: wire.progress.as_ref().and_then(coerce_progress),
        },
        Err(_) => LogLine::Raw(trimmed.to_string()),
    }
}

// integers, floats and numeric strings are all seen in the wild
fn coerce_progress(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if raw.is_nan() {
        return None;
    }
    Some(raw.clamp(0.0, 100.0).round() as u8)
}
