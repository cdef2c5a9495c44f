//! Message lifetime policy.
//!
//! Everything here is a pure function of an expiry instant and "now", so the
//! engine, the server and the terminal view agree on what is still visible.

use chrono::TimeDelta;
use std::fmt;

use crate::models::{Message, Timestamp};

/// How long a message stays visible after creation.
pub const MESSAGE_LIFETIME: TimeDelta = TimeDelta::hours(24);

/// Expiry instant for a message created at `created_at`.
#[must_use]
pub fn expires_at_for(created_at: Timestamp) -> Timestamp {
    Timestamp(created_at.0 + MESSAGE_LIFETIME)
}

/// `true` once `now` has reached the expiry instant.
#[must_use]
pub fn is_expired(expires_at: Timestamp, now: Timestamp) -> bool {
    now >= expires_at
}

/// Convenience wrapper over [`is_expired`] for a whole message.
#[must_use]
pub fn message_expired(message: &Message, now: Timestamp) -> bool {
    is_expired(message.expires_at, now)
}

/// Time left before a message expires, truncated to whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRemaining {
    Expired,
    Remaining { hours: i64, minutes: i64 },
}

/// Computes the remaining lifetime of something expiring at `expires_at`.
#[must_use]
pub fn time_remaining(expires_at: Timestamp, now: Timestamp) -> TimeRemaining {
    let left = expires_at.0 - now.0;
    if left <= TimeDelta::zero() {
        return TimeRemaining::Expired;
    }

    let total_minutes = left.num_minutes();
    TimeRemaining::Remaining {
        hours: total_minutes / 60,
        minutes: total_minutes % 60,
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => f.write_str("Expired"),
            Self::Remaining { hours: 0, minutes } => write!(f, "{minutes}m left"),
            Self::Remaining { hours, minutes } => write!(f, "{hours}h {minutes}m left"),
        }
    }
}

/// Human readable remaining lifetime, e.g. `"3h 12m left"`.
#[must_use]
pub fn format_time_remaining(expires_at: Timestamp, now: Timestamp) -> String {
    time_remaining(expires_at, now).to_string()
}
