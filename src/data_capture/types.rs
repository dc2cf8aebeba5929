//! Common data types used across the data_capture subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag identifying which stream, or which lifecycle event, a record pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Bytes written by the invoking environment to the child.
    Stdin,
    /// Bytes produced by the child on standard output.
    Stdout,
    /// Bytes produced by the child on standard error.
    Stderr,
    /// Session start, carries the invocation arguments.
    Startup,
    /// Session end, carries the child's exit code.
    Exit,
    StdinError,
    StdoutError,
    StderrError,
}

impl Direction {
    /// Error tag for a stream direction. Lifecycle and error tags map to themselves.
    pub fn error_variant(self) -> Direction {
        match self {
            Direction::Stdin => Direction::StdinError,
            Direction::Stdout => Direction::StdoutError,
            Direction::Stderr => Direction::StderrError,
            other => other,
        }
    }

    /// Wire name written in the `fd` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Stdin => "STDIN",
            Direction::Stdout => "STDOUT",
            Direction::Stderr => "STDERR",
            Direction::Startup => "STARTUP",
            Direction::Exit => "EXIT",
            Direction::StdinError => "STDIN_ERROR",
            Direction::StdoutError => "STDOUT_ERROR",
            Direction::StderrError => "STDERR_ERROR",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified record payload. Serializes as `"type": "json", "json": ...`
/// or `"type": "text", "text": ...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    #[serde(rename = "json")]
    Json { json: Value },
    #[serde(rename = "text")]
    Text { text: String },
}

impl Payload {
    /// Decodes `data` lossily and keeps the parsed value when the text is valid JSON.
    pub fn classify(data: &[u8]) -> Payload {
        let text = String::from_utf8_lossy(data);
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => Payload::Json { json },
            Err(_) => Payload::Text {
                text: text.into_owned(),
            },
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Payload::Json { .. })
    }
}

/// One line of the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(with = "millis_timestamp")]
    pub time: DateTime<Utc>,
    #[serde(rename = "fd")]
    pub direction: Direction,
    #[serde(flatten)]
    pub payload: Payload,
}

impl LogRecord {
    /// Builds a record stamped with the current time from raw stream bytes.
    pub fn classify(direction: Direction, data: &[u8]) -> Self {
        Self {
            time: Utc::now(),
            direction,
            payload: Payload::classify(data),
        }
    }

    /// Builds a plain-text record; used for lifecycle events and failures.
    pub fn text(direction: Direction, text: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            direction,
            payload: Payload::Text { text: text.into() },
        }
    }

    /// Serialized form without the trailing newline.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

mod millis_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
