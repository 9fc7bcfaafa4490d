//! Ingestion of landing records
//!
//! Turns raw JSONL lines into validated [`MessageEvent`]s, redacts them and
//! groups them into conversations.
//!
//! ## Stages
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ landing line │ ──► │ parse_event │ ──► │   sanitize   │ ──► │   assemble   │
//! │   (JSONL)    │     │             │     │ (redaction)  │     │ (by conv id) │
//! └──────────────┘     └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! A line that fails to decode yields an [`InvalidRecord`]. Invalid records are
//! counted and skipped by the pipeline; they never abort a run.

pub mod assemble;
pub mod sanitize;

pub use assemble::assemble;
pub use sanitize::{sanitize, sanitize_event};

use crate::types::{MessageEvent, Role};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Why a landing line was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRecord {
    #[error("blank line")]
    Blank,

    /// Not a JSON object, or a field has the wrong type
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("empty required field: {0}")]
    EmptyField(&'static str),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid event_time: {0}")]
    InvalidTimestamp(String),
}

/// Record shape before validation. Every field is optional so a missing field
/// is reported by name instead of as a generic decode error.
#[derive(Debug, Deserialize)]
struct RawEvent {
    event_time: Option<String>,
    conversation_id: Option<String>,
    message_id: Option<String>,
    role: Option<String>,
    content: Option<String>,
    team: Option<String>,
    user_id: Option<String>,
}

/// Parse and validate one landing line.
///
/// Unknown fields are ignored. All seven fields are required non-empty
/// strings and `role` must be `user`, `assistant` or `system`.
pub fn parse_event(line: &str) -> std::result::Result<MessageEvent, InvalidRecord> {
    if line.trim().is_empty() {
        return Err(InvalidRecord::Blank);
    }

    let raw: RawEvent =
        serde_json::from_str(line).map_err(|e| InvalidRecord::Malformed(e.to_string()))?;

    let event_time = required(raw.event_time, "event_time")?;
    let conversation_id = required(raw.conversation_id, "conversation_id")?;
    let message_id = required(raw.message_id, "message_id")?;
    let role = required(raw.role, "role")?;
    let content = required(raw.content, "content")?;
    let team = required(raw.team, "team")?;
    let user_id = required(raw.user_id, "user_id")?;

    let role: Role = role.parse().map_err(|_| InvalidRecord::InvalidRole(role))?;
    let event_time = parse_event_time(&event_time)?;

    Ok(MessageEvent {
        event_time,
        conversation_id,
        message_id,
        role,
        content,
        team,
        user_id,
    })
}

fn required(
    value: Option<String>,
    field: &'static str,
) -> std::result::Result<String, InvalidRecord> {
    match value {
        None => Err(InvalidRecord::MissingField(field)),
        Some(v) if v.is_empty() => Err(InvalidRecord::EmptyField(field)),
        Some(v) => Ok(v),
    }
}

/// RFC 3339 with any offset, or a naive timestamp taken as UTC.
pub fn parse_event_time(value: &str) -> std::result::Result<DateTime<Utc>, InvalidRecord> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| InvalidRecord::InvalidTimestamp(value.to_string()))
}
