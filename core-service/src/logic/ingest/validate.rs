//! Structural validation, before an event reaches a session worker.

use chrono::{DateTime, Duration, Utc};

use super::types::IngestEvent;
use crate::constants::MAX_CLOCK_SKEW_SECS;

/// Longest accepted platform identifier
pub const MAX_ID_LEN: usize = 256;

pub fn validate(event: &IngestEvent, now: DateTime<Utc>) -> Result<(), String> {
    let latest = now + Duration::seconds(MAX_CLOCK_SKEW_SECS);

    match event {
        IngestEvent::SessionStart(e) => {
            check_time("started_at", e.started_at, latest)?;
        }
        IngestEvent::SessionEnd(e) => {
            check_time("ended_at", e.ended_at, latest)?;
        }
        IngestEvent::ParticipantSeen(e) => {
            check_id("platform_user_id", &e.platform_user_id)?;
            check_time("seen_at", e.seen_at, latest)?;
            if let Some(age) = e.age_estimate {
                if !(0..=120).contains(&age) {
                    return Err(format!("age_estimate {} out of range", age));
                }
            }
        }
        IngestEvent::MessageReceived(e) => {
            check_id("sender_id", &e.sender_id)?;
            if let Some(id) = &e.platform_message_id {
                check_id("platform_message_id", id)?;
            }
            if e.content_hash.trim().is_empty() {
                return Err("content_hash is empty".into());
            }
            check_time("timestamp", Some(e.timestamp), latest)?;
        }
        IngestEvent::MessageAmended(e) => {
            check_id("platform_message_id", &e.platform_message_id)?;
            check_time("at", Some(e.at), latest)?;
        }
    }
    Ok(())
}

fn check_id(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is empty", field));
    }
    if value.len() > MAX_ID_LEN {
        return Err(format!("{} longer than {} bytes", field, MAX_ID_LEN));
    }
    Ok(())
}

fn check_time(field: &str, value: Option<DateTime<Utc>>, latest: DateTime<Utc>) -> Result<(), String> {
    match value {
        Some(ts) if ts > latest => Err(format!("{} {} is in the future", field, ts.to_rfc3339())),
        _ => Ok(()),
    }
}
