//! # Reward Record
//!
//! One document per user, keyed by user id.
//!
//! ## Schema
//! - points (**int**): accumulated balance, only grows through claims
//! - lastDailyClaimedAt (**RFC 3339 string**): last daily claim
//! - lastPhotoEarnAt (**RFC 3339 string**): last photo reward claim
//! - photoSubmittedAt (**RFC 3339 string**): last photo submission
//!
//! Absent fields mean "never happened". A missing document reads as all defaults,
//! there is no explicit creation step.
//!
//! ## Gallery
//! - Append-only collection of submitted photos, public within the namespace
//! - Fields: userId (**string**), timestamp (**RFC 3339 string**), fileName (**string**), imageUrl (**data URL string**)
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::RewardError, store::Fields, utils::sanitize_file_name};

pub const DAILY_AWARD: u64 = 10;
pub const PHOTO_AWARD: u64 = 50;

pub const MAX_PHOTO_BYTES: u64 = 500 * 1024;

pub const RECORD_POINTS: &str = "points";
pub const RECORD_LAST_DAILY: &str = "lastDailyClaimedAt";
pub const RECORD_LAST_PHOTO_EARN: &str = "lastPhotoEarnAt";
pub const RECORD_PHOTO_SUBMITTED: &str = "photoSubmittedAt";

pub fn daily_cooldown() -> Duration {
    Duration::hours(24)
}

pub fn photo_submission_cooldown() -> Duration {
    Duration::hours(24)
}

pub fn photo_claim_cooldown() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecord {
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub last_daily_claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_photo_earn_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub photo_submitted_at: Option<DateTime<Utc>>,
}

impl RewardRecord {
    pub fn from_fields(fields: &Fields) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(fields.clone()))
    }

    /// Balance after adding `award`, or an error if the stored balance is already
    /// at the edge of the integer range.
    pub fn awarded(&self, award: u64) -> Result<u64, RewardError> {
        self.points.checked_add(award).ok_or_else(|| {
            RewardError::MalformedRecord(format!("balance {} out of range", self.points))
        })
    }

    pub fn merge(&mut self, patch: &RecordPatch) {
        if let Some(points) = patch.points {
            self.points = points;
        }
        if patch.last_daily_claimed_at.is_some() {
            self.last_daily_claimed_at = patch.last_daily_claimed_at;
        }
        if patch.last_photo_earn_at.is_some() {
            self.last_photo_earn_at = patch.last_photo_earn_at;
        }
        if patch.photo_submitted_at.is_some() || patch.clear_photo_submitted {
            self.photo_submitted_at = patch.photo_submitted_at;
        }
    }
}

/// Partial record. Only present fields are written, the rest of the stored
/// document is left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub points: Option<u64>,
    pub last_daily_claimed_at: Option<DateTime<Utc>>,
    pub last_photo_earn_at: Option<DateTime<Utc>>,
    pub photo_submitted_at: Option<DateTime<Utc>>,
    /// Writes `photoSubmittedAt` as null when `photo_submitted_at` is `None`.
    pub clear_photo_submitted: bool,
}

impl RecordPatch {
    /// Puts `photoSubmittedAt` back to `previous`, clearing it when there was none.
    pub fn restoring_photo_submission(previous: Option<DateTime<Utc>>) -> Self {
        Self {
            photo_submitted_at: previous,
            clear_photo_submitted: previous.is_none(),
            ..Default::default()
        }
    }

    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();

        if self.clear_photo_submitted && self.photo_submitted_at.is_none() {
            fields.insert(RECORD_PHOTO_SUBMITTED.to_string(), Value::Null);
        }

        if let Some(points) = self.points {
            fields.insert(RECORD_POINTS.to_string(), Value::from(points));
        }

        let stamps = [
            (RECORD_LAST_DAILY, self.last_daily_claimed_at),
            (RECORD_LAST_PHOTO_EARN, self.last_photo_earn_at),
            (RECORD_PHOTO_SUBMITTED, self.photo_submitted_at),
        ];
        for (name, stamp) in stamps {
            if let Some(stamp) = stamp {
                fields.insert(name.to_string(), Value::String(stamp.to_rfc3339()));
            }
        }

        fields
    }
}

/// Upload handed over by the presentation layer, already read as a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoFile {
    pub name: String,
    pub size: u64,
    pub data_url: String,
}

impl PhotoFile {
    pub fn is_too_large(&self) -> bool {
        self.size > MAX_PHOTO_BYTES
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    #[serde(skip)]
    pub id: String,
    pub user_id: String,
    #[serde(rename = "timestamp")]
    pub submitted_at: DateTime<Utc>,
    pub file_name: String,
    pub image_url: String,
}

impl GalleryEntry {
    pub fn new(user_id: &str, submitted_at: DateTime<Utc>, file: &PhotoFile) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.to_string(),
            submitted_at,
            file_name: sanitize_file_name(&file.name),
            image_url: file.data_url.clone(),
        }
    }

    pub fn from_fields(id: &str, fields: &Fields) -> Result<Self, serde_json::Error> {
        let mut entry: Self = serde_json::from_value(Value::Object(fields.clone()))?;
        entry.id = id.to_string();

        Ok(entry)
    }

    pub fn to_fields(&self) -> Result<Fields, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            _ => Err(serde::ser::Error::custom("gallery entry is not an object")),
        }
    }
}
