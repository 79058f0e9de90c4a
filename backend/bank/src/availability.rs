//! # Cooldowns
//!
//! Every window is closed-open: an action stamped at `t` blocks the same action
//! over `[t, t + window)`, and `now == t + window` is eligible again. A missing
//! stamp never blocks.
use chrono::{DateTime, Duration, Utc};

use crate::{
    error::RewardError,
    record::{RewardRecord, daily_cooldown, photo_claim_cooldown, photo_submission_cooldown},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub remaining: Duration,
}

impl Availability {
    pub fn now() -> Self {
        Self {
            available: true,
            remaining: Duration::zero(),
        }
    }
}

pub fn next_eligible(stamp: Option<DateTime<Utc>>, window: Duration) -> Option<DateTime<Utc>> {
    stamp.map(|stamp| stamp + window)
}

fn window_availability(
    stamp: Option<DateTime<Utc>>,
    window: Duration,
    now: DateTime<Utc>,
) -> Availability {
    match next_eligible(stamp, window) {
        None => Availability::now(),
        Some(next) => Availability {
            available: now >= next,
            remaining: (next - now).max(Duration::zero()),
        },
    }
}

pub fn daily_availability(record: &RewardRecord, now: DateTime<Utc>) -> Availability {
    window_availability(record.last_daily_claimed_at, daily_cooldown(), now)
}

pub fn photo_submission_availability(record: &RewardRecord, now: DateTime<Utc>) -> Availability {
    window_availability(record.photo_submitted_at, photo_submission_cooldown(), now)
}

/// A submission only unlocks the photo reward while its own window is still open.
pub fn submission_window_open(record: &RewardRecord, now: DateTime<Utc>) -> bool {
    match next_eligible(record.photo_submitted_at, photo_submission_cooldown()) {
        Some(closes) => now < closes,
        None => false,
    }
}

/// `remaining` is the claim cooldown. `available` additionally requires a recent
/// submission.
pub fn photo_claim_availability(record: &RewardRecord, now: DateTime<Utc>) -> Availability {
    let claim = window_availability(record.last_photo_earn_at, photo_claim_cooldown(), now);

    Availability {
        available: claim.available && submission_window_open(record, now),
        remaining: claim.remaining,
    }
}

pub fn check_photo_claim(record: &RewardRecord, now: DateTime<Utc>) -> Result<(), RewardError> {
    if !submission_window_open(record, now) {
        return Err(RewardError::NoRecentSubmission);
    }

    if !window_availability(record.last_photo_earn_at, photo_claim_cooldown(), now).available {
        return Err(RewardError::AlreadyClaimed);
    }

    Ok(())
}
