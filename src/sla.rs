//! SLA timing: response and resolution durations in whole minutes.
//!
//! Pure functions over timestamps. The live lifecycle engine and the backfill
//! reconciler both derive their numbers here, so a ticket repaired after the
//! fact carries exactly the figures it would have had live.

use chrono::{DateTime, Utc};

/// Whole minutes from `from` to `to`, floored, never negative.
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes().max(0)
}

/// Minutes a ticket waited before a technician accepted it.
pub fn response_time(created_at: DateTime<Utc>, accepted_at: Option<DateTime<Utc>>) -> Option<i64> {
    accepted_at.map(|accepted| minutes_between(created_at, accepted))
}

/// Minutes from acceptance to completion.
///
/// A ticket completed without ever being accepted is measured from creation.
pub fn resolution_time(
    accepted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
) -> Option<i64> {
    let completed = completed_at?;
    Some(minutes_between(accepted_at.unwrap_or(created_at), completed))
}

/// Both derived durations for one ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlaTimes {
    pub response_time: Option<i64>,
    pub resolution_time: Option<i64>,
}

impl SlaTimes {
    /// Derive both durations from whatever timestamps are known.
    ///
    /// Completion without acceptance counts as an immediate response
    /// (`response_time = 0`) rather than leaving it unset.
    pub fn derive(
        created_at: DateTime<Utc>,
        accepted_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        let response_time = match (accepted_at, completed_at) {
            (None, Some(_)) => Some(0),
            _ => response_time(created_at, accepted_at),
        };
        Self {
            response_time,
            resolution_time: resolution_time(accepted_at, completed_at, created_at),
        }
    }
}
