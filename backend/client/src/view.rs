//! # Presentation
//!
//! Everything a frontend needs to draw the reward panel, recomputed every tick
//! and after every state change.
//!
//! ## Controls
//! - Daily claim, photo submission, photo claim
//! - Each one is a `{ disabled, label, message }` triple plus a tone for styling
//! - A control with an action in flight stays disabled until the action settles
//!
//! ## Points
//! - `None` whenever the record is unknown, drawn as "N/A"
use bank::{
    FeedStatus, PhotoFile, RewardError, RewardRecord, RewardState,
    availability::{
        check_photo_claim, daily_availability, photo_claim_availability,
        photo_submission_availability,
    },
    record::{DAILY_AWARD, MAX_PHOTO_BYTES, PHOTO_AWARD},
};
use chrono::{DateTime, Utc};

use crate::utils::{format_time_remaining, kilobytes};

pub const NOT_AVAILABLE: &str = "N/A";
pub const PROCESSING: &str = "Processing...";

const AUTH_REQUIRED: &str = "Authentication/Database required for rewards.";
const LOADING: &str = "Loading your rewards...";
const LOAD_FAILED: &str = "Error loading reward data. Check your connection and try again.";
const LIVE_PAUSED: &str = "Live updates paused, reconnecting...";
const WELCOME: &str = "Welcome! No daily reward claimed yet. Your progress will be saved.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tone {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionView {
    pub disabled: bool,
    pub label: String,
    /// Empty when there is nothing to say.
    pub message: String,
    pub tone: Tone,
}

impl ActionView {
    fn enabled(label: impl Into<String>) -> Self {
        Self {
            disabled: false,
            label: label.into(),
            ..Default::default()
        }
    }

    fn blocked(label: impl Into<String>, message: impl Into<String>, tone: Tone) -> Self {
        Self {
            disabled: true,
            label: label.into(),
            message: message.into(),
            tone,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn processing() -> Self {
        Self::blocked(PROCESSING, "", Tone::Info)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardView {
    pub points: Option<u64>,
    pub user: Option<String>,
    pub banner: Option<String>,
    pub daily: ActionView,
    pub submit_photo: ActionView,
    pub claim_photo: ActionView,
}

impl RewardView {
    pub fn points_label(&self) -> String {
        self.points
            .map_or_else(|| NOT_AVAILABLE.to_string(), |points| points.to_string())
    }
}

/// Controls with an action in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending {
    pub daily: bool,
    pub submit_photo: bool,
    pub claim_photo: bool,
}

pub fn render(
    state: &RewardState,
    now: DateTime<Utc>,
    pending: Pending,
    selected: Option<&PhotoFile>,
) -> RewardView {
    let user = state.user.as_ref().map(|user| user.to_string());

    let mut view = match (&state.user, &state.record) {
        (None, _) => unavailable(user, AUTH_REQUIRED, Tone::Warning),
        (Some(_), None) if state.feed == FeedStatus::Unavailable => {
            unavailable(user, LOAD_FAILED, Tone::Error)
        }
        (Some(_), None) => unavailable(user, LOADING, Tone::Info),
        (Some(_), Some(record)) => RewardView {
            points: Some(record.points),
            user,
            banner: (state.feed == FeedStatus::Unavailable).then(|| LIVE_PAUSED.to_string()),
            daily: daily_view(record, now, state.is_new()),
            submit_photo: submit_view(record, now, selected),
            claim_photo: claim_view(record, now),
        },
    };

    if pending.daily {
        view.daily = ActionView::processing();
    }
    if pending.submit_photo {
        view.submit_photo = ActionView::processing();
    }
    if pending.claim_photo {
        view.claim_photo = ActionView::processing();
    }

    view
}

fn unavailable(user: Option<String>, banner: &str, tone: Tone) -> RewardView {
    let control = |label: &str| ActionView::blocked(label, banner, tone);

    RewardView {
        points: None,
        user,
        banner: Some(banner.to_string()),
        daily: control(claim_daily_label().as_str()),
        submit_photo: control("Select Photo to Enable Submit"),
        claim_photo: control(claim_photo_label().as_str()),
    }
}

fn claim_daily_label() -> String {
    format!("Claim Daily Reward ({DAILY_AWARD} Points)")
}

fn claim_photo_label() -> String {
    format!("Claim Photo Rewards (Earn {PHOTO_AWARD} Points)")
}

fn daily_view(record: &RewardRecord, now: DateTime<Utc>, is_new: bool) -> ActionView {
    let daily = daily_availability(record, now);

    if !daily.available {
        let remaining = format_time_remaining(daily.remaining);

        return ActionView::blocked(
            format!("Next claim in {remaining}"),
            format!("You can claim your next daily reward in {remaining}."),
            Tone::Info,
        );
    }

    let view = ActionView::enabled(claim_daily_label());
    if is_new { view.with_message(WELCOME) } else { view }
}

fn submit_view(
    record: &RewardRecord,
    now: DateTime<Utc>,
    selected: Option<&PhotoFile>,
) -> ActionView {
    let submission = photo_submission_availability(record, now);

    if !submission.available {
        let remaining = format_time_remaining(submission.remaining);

        return ActionView::blocked(
            format!("Already submitted today! Next submission in {remaining}"),
            format!("You've already submitted a photo today. Next submission in {remaining}."),
            Tone::Info,
        );
    }

    match selected {
        None => ActionView::blocked(
            "Select Photo to Enable Submit",
            "Please select a photo to submit.",
            Tone::Info,
        ),
        Some(file) if file.is_too_large() => ActionView::blocked(
            "File Too Large",
            format!(
                "File is too large ({}). Max size: {}KB.",
                kilobytes(file.size),
                MAX_PHOTO_BYTES / 1024
            ),
            Tone::Error,
        ),
        Some(file) => ActionView::enabled(format!("Submit Photo: {}", file.name)),
    }
}

fn claim_view(record: &RewardRecord, now: DateTime<Utc>) -> ActionView {
    match check_photo_claim(record, now) {
        Ok(()) => ActionView::enabled(claim_photo_label()),
        Err(RewardError::NoRecentSubmission) => ActionView::blocked(
            "Submit a photo above to enable claiming.",
            "Submit a photo to unlock your daily points.",
            Tone::Info,
        ),
        Err(_) => {
            let remaining = format_time_remaining(photo_claim_availability(record, now).remaining);

            ActionView::blocked(
                format!("Already Claimed. Next claim in {remaining}"),
                format!(
                    "You've already claimed points for a photo today. Next claim in {remaining}."
                ),
                Tone::Info,
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ClaimDaily,
    SubmitPhoto,
    ClaimPhoto,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::ClaimDaily => "claim daily reward",
            Action::SubmitPhoto => "submit photo",
            Action::ClaimPhoto => "claim photo reward",
        }
    }
}

/// One-off message shown after an action settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub tone: Tone,
    pub text: String,
}

impl Notice {
    pub fn from_outcome<T>(action: Action, result: &Result<T, RewardError>) -> Self {
        match result {
            Ok(_) => Self {
                tone: Tone::Success,
                text: match action {
                    Action::ClaimDaily => format!("Successfully claimed {DAILY_AWARD} daily points!"),
                    Action::SubmitPhoto => "Photo successfully submitted to gallery!".to_string(),
                    Action::ClaimPhoto => format!("Successfully claimed {PHOTO_AWARD} photo points!"),
                },
            },
            Err(RewardError::AuthRequired) => Self {
                tone: Tone::Warning,
                text: "Website not ready. Please wait or check authentication.".to_string(),
            },
            Err(e @ RewardError::PayloadTooLarge { .. }) => Self {
                tone: Tone::Error,
                text: format!("{e}."),
            },
            Err(e) if e.is_fault() => Self {
                tone: Tone::Error,
                text: format!("Failed to {}: {e}.", action.verb()),
            },
            Err(e) => Self {
                tone: Tone::Info,
                text: format!("{e}."),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use bank::{StoreError, UserId};
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
    }

    fn live(record: RewardRecord, revision: u64) -> RewardState {
        RewardState {
            user: Some(UserId::new("user-1")),
            revision,
            record: Some(record),
            feed: FeedStatus::Live,
        }
    }

    fn photo(size: u64) -> PhotoFile {
        PhotoFile {
            name: "cat.png".into(),
            size,
            data_url: "data:image/png;base64,AAAA".into(),
        }
    }

    #[test]
    fn test_signed_out() {
        let view = render(&RewardState::default(), t0(), Pending::default(), None);

        assert_eq!(view.points_label(), "N/A");
        assert_eq!(view.banner.as_deref(), Some(AUTH_REQUIRED));
        assert!(view.daily.disabled && view.submit_photo.disabled && view.claim_photo.disabled);
    }

    #[test]
    fn test_store_unavailable() {
        let state = RewardState {
            user: Some(UserId::new("user-1")),
            feed: FeedStatus::Unavailable,
            ..Default::default()
        };
        let view = render(&state, t0(), Pending::default(), None);

        assert!(view.points.is_none());
        assert_eq!(view.banner.as_deref(), Some(LOAD_FAILED));
        assert_eq!(view.daily.tone, Tone::Error);
        assert!(view.daily.disabled);
    }

    #[test]
    fn test_cached_record_without_feed() {
        let state = RewardState {
            feed: FeedStatus::Unavailable,
            ..live(RewardRecord { points: 10, ..Default::default() }, 3)
        };
        let view = render(&state, t0(), Pending::default(), None);

        assert_eq!(view.points, Some(10));
        assert_eq!(view.banner.as_deref(), Some(LIVE_PAUSED));
        assert!(view.daily.message.is_empty());
    }

    #[test]
    fn test_new_user() {
        let view = render(&live(RewardRecord::default(), 0), t0(), Pending::default(), None);

        assert_eq!(view.points_label(), "0");
        assert!(view.banner.is_none());
        assert!(!view.daily.disabled);
        assert_eq!(view.daily.label, "Claim Daily Reward (10 Points)");
        assert_eq!(view.daily.message, WELCOME);
        assert!(view.submit_photo.disabled);
        assert_eq!(view.submit_photo.label, "Select Photo to Enable Submit");
        assert_eq!(view.claim_photo.label, "Submit a photo above to enable claiming.");
    }

    #[test]
    fn test_daily_cooldown() {
        let record = RewardRecord {
            points: 10,
            last_daily_claimed_at: Some(t0()),
            ..Default::default()
        };
        let now = t0() + Duration::hours(18) + Duration::minutes(30);
        let view = render(&live(record, 1), now, Pending::default(), None);

        assert!(view.daily.disabled);
        assert_eq!(view.daily.label, "Next claim in 5h 30m");
        assert_eq!(
            view.daily.message,
            "You can claim your next daily reward in 5h 30m."
        );
    }

    #[test]
    fn test_selected_photo() {
        let state = live(RewardRecord::default(), 2);

        let view = render(&state, t0(), Pending::default(), Some(&photo(2048)));
        assert!(!view.submit_photo.disabled);
        assert_eq!(view.submit_photo.label, "Submit Photo: cat.png");
        assert!(view.submit_photo.message.is_empty());

        let view = render(&state, t0(), Pending::default(), Some(&photo(501 * 1024)));
        assert!(view.submit_photo.disabled);
        assert_eq!(view.submit_photo.label, "File Too Large");
        assert_eq!(
            view.submit_photo.message,
            "File is too large (501.0KB). Max size: 500KB."
        );
        assert_eq!(view.submit_photo.tone, Tone::Error);
    }

    #[test]
    fn test_photo_flow() {
        let submitted = RewardRecord {
            photo_submitted_at: Some(t0()),
            ..Default::default()
        };
        let view = render(
            &live(submitted.clone(), 1),
            t0() + Duration::hours(1),
            Pending::default(),
            Some(&photo(10)),
        );
        assert!(view.submit_photo.disabled);
        assert_eq!(
            view.submit_photo.label,
            "Already submitted today! Next submission in 23h"
        );
        assert!(!view.claim_photo.disabled);
        assert_eq!(view.claim_photo.label, "Claim Photo Rewards (Earn 50 Points)");

        let claimed = RewardRecord {
            last_photo_earn_at: Some(t0() + Duration::hours(1)),
            points: 50,
            ..submitted
        };
        let view = render(
            &live(claimed, 2),
            t0() + Duration::hours(2),
            Pending::default(),
            None,
        );
        assert!(view.claim_photo.disabled);
        assert_eq!(view.claim_photo.label, "Already Claimed. Next claim in 23h");
    }

    #[test]
    fn test_pending_controls_stay_disabled() {
        let pending = Pending {
            daily: true,
            ..Default::default()
        };
        let view = render(&live(RewardRecord::default(), 1), t0(), pending, None);

        assert!(view.daily.disabled);
        assert_eq!(view.daily.label, PROCESSING);
        assert!(!view.claim_photo.label.is_empty());
    }

    #[test]
    fn test_notices() {
        let ok: Result<u64, RewardError> = Ok(10);
        assert_eq!(
            Notice::from_outcome(Action::ClaimDaily, &ok),
            Notice {
                tone: Tone::Success,
                text: "Successfully claimed 10 daily points!".into()
            }
        );

        let rejected: Result<u64, RewardError> = Err(RewardError::AlreadyClaimed);
        assert_eq!(Notice::from_outcome(Action::ClaimPhoto, &rejected).tone, Tone::Info);

        let failed: Result<u64, RewardError> = Err(RewardError::StoreUnavailable(
            StoreError::Unavailable("timeout".into()),
        ));
        let notice = Notice::from_outcome(Action::ClaimDaily, &failed);
        assert_eq!(notice.tone, Tone::Error);
        assert!(notice.text.starts_with("Failed to claim daily reward"));

        let too_large: Result<(), RewardError> = Err(RewardError::PayloadTooLarge {
            size: 600,
            max: 500,
        });
        assert_eq!(Notice::from_outcome(Action::SubmitPhoto, &too_large).tone, Tone::Error);
    }
}
