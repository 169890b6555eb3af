//! Peer roles and the plain-text wire format.
//!
//! Two forms travel on the shared channel:
//!
//! - plain beat: `[from: iot] [01/01/2025 13:05]`
//! - acknowledging beat: `[from: vm] [01/01/2025 13:05] : OK / [01/01/2025 13:06]`
//!
//! The acknowledging form references the prior exchanged minute in its first
//! bracket and the sender's own minute in the second.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};

use crate::error::{DecodeError, Error};

const TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// One of the two protocol participants. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Iot,
    Vm,
}

impl Role {
    pub fn parse(s: &str) -> Result<Role, Error> {
        match s.trim().to_lowercase().as_str() {
            "iot" => Ok(Role::Iot),
            "vm" => Ok(Role::Vm),
            other => Err(Error::InvalidConfiguration(format!(
                "invalid role {other:?}, use 'iot' or 'vm'"
            ))),
        }
    }

    pub fn counterpart(self) -> Role {
        match self {
            Role::Iot => Role::Vm,
            Role::Vm => Role::Iot,
        }
    }

    /// IoT owns odd minutes, VM owns even minutes.
    pub fn sends_on(self, minute: u32) -> bool {
        match self {
            Role::Iot => minute % 2 == 1,
            Role::Vm => minute % 2 == 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Iot => "iot",
            Role::Vm => "vm",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded heartbeat. Timestamps carry minute precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub sender: Role,
    pub timestamp: NaiveDateTime,
    /// Second bracketed timestamp of the acknowledging form: the minute the
    /// sender expects to speak next. `None` for a plain beat.
    pub ack_window_end: Option<NaiveDateTime>,
}

impl Heartbeat {
    /// First beat of an exchange, before any round trip.
    pub fn plain(sender: Role, now: DateTime<Utc>) -> Heartbeat {
        Heartbeat {
            sender,
            timestamp: to_minute(now.naive_utc()),
            ack_window_end: None,
        }
    }

    /// Reply referencing the prior exchanged minute.
    pub fn acknowledging(sender: Role, now: DateTime<Utc>) -> Heartbeat {
        let now = to_minute(now.naive_utc());
        Heartbeat {
            sender,
            timestamp: now - Duration::minutes(1),
            ack_window_end: Some(now),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.ack_window_end.is_some()
    }

    /// The minute being acknowledged, once a round trip has happened.
    pub fn acknowledged_timestamp(&self) -> Option<NaiveDateTime> {
        self.is_ack().then_some(self.timestamp)
    }
}

fn to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

pub fn encode(beat: &Heartbeat) -> String {
    let ts = beat.timestamp.format(TIME_FORMAT);
    match beat.ack_window_end {
        Some(end) => format!(
            "[from: {}] [{ts}] : OK / [{}]",
            beat.sender,
            end.format(TIME_FORMAT)
        ),
        None => format!("[from: {}] [{ts}]", beat.sender),
    }
}

/// Parse a wire payload. The `[from: ...]` tag is mandatory: untagged
/// payloads are rejected rather than attributed to the counterpart.
pub fn decode(raw: &str) -> Result<Heartbeat, DecodeError> {
    let sender = if raw.contains("[from: iot]") {
        Role::Iot
    } else if raw.contains("[from: vm]") {
        Role::Vm
    } else {
        return Err(DecodeError::MissingSenderTag);
    };

    let mut timestamps = raw
        .split('[')
        .filter_map(|chunk| chunk.split(']').next())
        .filter_map(|inner| NaiveDateTime::parse_from_str(inner.trim(), TIME_FORMAT).ok());

    let timestamp = timestamps.next().ok_or(DecodeError::MissingTimestamp)?;
    Ok(Heartbeat {
        sender,
        timestamp,
        ack_window_end: timestamps.next(),
    })
}
