//! # Reward State
//!
//! Holds the cached reward record of the signed in user and runs every claim
//! against the store.
//!
//! ## Cache
//! - Kept current by a live subscription, one per manager
//! - Published through a `watch` channel, listeners only wake on real changes
//! - Deliveries older than the cached revision are dropped, duplicates are no-ops
//! - Never used to decide a write
//!
//! ## Writes
//! 1. Read the record straight from the store
//! 2. Check the cooldown rules against that fresh copy
//! 3. Merge the change conditioned on the revision read in step 1
//! 4. Someone else wrote in between: start over, up to `max_attempts` times
//!
//! The committed record is pushed into the cache right away, the feed catches up
//! with the same revision later. Only the feed marks the cache live.
//!
//! ## Submissions
//! The `photoSubmittedAt` stamp claims the window before the gallery insert. A
//! failed insert releases the window again, restoring the previous stamp.
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    availability::{self, Availability},
    error::{RewardError, StoreError},
    identity::UserId,
    record::{
        DAILY_AWARD, GalleryEntry, MAX_PHOTO_BYTES, PHOTO_AWARD, PhotoFile, RecordPatch,
        RewardRecord,
    },
    store::{Document, DocumentStore, gallery_path, record_path},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub namespace: String,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedStatus {
    #[default]
    Detached,
    Live,
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardState {
    pub user: Option<UserId>,
    pub revision: u64,
    /// `None` while unknown, shown as "N/A".
    pub record: Option<RewardRecord>,
    pub feed: FeedStatus,
}

impl RewardState {
    /// Live, and the user has no stored record yet.
    pub fn is_new(&self) -> bool {
        self.feed == FeedStatus::Live && self.revision == 0
    }
}

struct Subscription {
    user: UserId,
    task: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct RewardManager {
    store: Arc<dyn DocumentStore>,
    settings: Settings,
    state: Arc<watch::Sender<RewardState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl RewardManager {
    pub fn new(store: Arc<dyn DocumentStore>, settings: Settings) -> Self {
        let (state, _) = watch::channel(RewardState::default());

        Self {
            store,
            settings,
            state: Arc::new(state),
            subscription: Mutex::new(None),
        }
    }

    pub fn listen(&self) -> watch::Receiver<RewardState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> RewardState {
        self.state.borrow().clone()
    }

    pub fn attached_user(&self) -> Option<UserId> {
        self.lock_subscription()
            .as_ref()
            .map(|subscription| subscription.user.clone())
    }

    /// Replaces any previous subscription, then waits for the first snapshot of
    /// the user's record before returning.
    pub async fn attach(&self, user: UserId) -> Result<(), RewardError> {
        self.detach();

        self.state.send_replace(RewardState {
            user: Some(user.clone()),
            ..Default::default()
        });

        let path = record_path(&self.settings.namespace, user.as_str());

        let mut feed = match self.store.subscribe(&path).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!("Could not subscribe to rewards of {user}: {e}");
                mark_unavailable(&self.state, &user);

                return Err(RewardError::StoreUnavailable(e));
            }
        };

        match feed.recv().await {
            Some(Ok(document)) => apply_document(&self.state, &user, document),
            Some(Err(e)) => {
                warn!("Initial read of rewards for {user} failed: {e}");
                mark_unavailable(&self.state, &user);

                return Err(RewardError::StoreUnavailable(e));
            }
            None => {
                mark_unavailable(&self.state, &user);

                return Err(RewardError::StoreUnavailable(StoreError::Unavailable(
                    "feed closed before the first snapshot".into(),
                )));
            }
        }

        let state = self.state.clone();
        let feed_user = user.clone();
        let task = tokio::spawn(async move {
            while let Some(update) = feed.recv().await {
                match update {
                    Ok(document) => apply_document(&state, &feed_user, document),
                    Err(e) => {
                        warn!("Reward feed for {feed_user} failed: {e}");
                        mark_unavailable(&state, &feed_user);
                    }
                }
            }

            debug!("Reward feed for {feed_user} closed");
        });

        *self.lock_subscription() = Some(Subscription {
            user: user.clone(),
            task,
        });
        info!("Attached reward feed for {user}");

        Ok(())
    }

    /// Stops the feed. The stored record is untouched, the cache goes back to unknown.
    pub fn detach(&self) {
        if let Some(subscription) = self.lock_subscription().take() {
            info!("Detached reward feed for {}", subscription.user);
        }

        self.state.send_if_modified(|state| {
            if *state == RewardState::default() {
                return false;
            }

            *state = RewardState::default();
            true
        });
    }

    pub fn daily_availability(&self, now: DateTime<Utc>) -> Availability {
        availability::daily_availability(&self.cached_record(), now)
    }

    pub fn photo_submission_availability(&self, now: DateTime<Utc>) -> Availability {
        availability::photo_submission_availability(&self.cached_record(), now)
    }

    pub fn photo_claim_availability(&self, now: DateTime<Utc>) -> Availability {
        availability::photo_claim_availability(&self.cached_record(), now)
    }

    pub async fn claim_daily(&self, now: DateTime<Utc>) -> Result<u64, RewardError> {
        let user = self.current_user()?;

        let result = self
            .commit(&user, |record| {
                if !availability::daily_availability(record, now).available {
                    return Err(RewardError::NotEligible);
                }

                let points = record.awarded(DAILY_AWARD)?;
                let patch = RecordPatch {
                    points: Some(points),
                    last_daily_claimed_at: Some(now),
                    ..Default::default()
                };

                Ok((patch, points))
            })
            .await;

        if let Ok(points) = &result {
            info!("{user} claimed {DAILY_AWARD} daily points, balance {points}");
        }
        report("daily claim", &user, result)
    }

    pub async fn submit_photo(
        &self,
        now: DateTime<Utc>,
        file: &PhotoFile,
    ) -> Result<GalleryEntry, RewardError> {
        let user = self.current_user()?;

        if file.is_too_large() {
            return report(
                "photo submission",
                &user,
                Err(RewardError::PayloadTooLarge {
                    size: file.size,
                    max: MAX_PHOTO_BYTES,
                }),
            );
        }

        let result = self.submit(&user, now, file).await;
        report("photo submission", &user, result)
    }

    async fn submit(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
        file: &PhotoFile,
    ) -> Result<GalleryEntry, RewardError> {
        let previous = self
            .commit(user, |record| {
                if !availability::photo_submission_availability(record, now).available {
                    return Err(RewardError::NotEligible);
                }

                let patch = RecordPatch {
                    photo_submitted_at: Some(now),
                    ..Default::default()
                };

                Ok((patch, record.photo_submitted_at))
            })
            .await?;

        let mut entry = GalleryEntry::new(user.as_str(), now, file);
        let inserted = match entry.to_fields() {
            Ok(fields) => self
                .store
                .insert(&gallery_path(&self.settings.namespace), fields)
                .await
                .map_err(RewardError::from),
            Err(e) => Err(RewardError::MalformedRecord(e.to_string())),
        };

        match inserted {
            Ok(id) => entry.id = id,
            Err(e) => {
                warn!("Gallery insert for {user} failed, releasing the submission: {e}");
                self.release_submission(user, now, previous).await;

                return Err(e);
            }
        }

        info!("{user} submitted photo {} as {}", entry.file_name, entry.id);

        Ok(entry)
    }

    /// Undoes the `photoSubmittedAt` stamp of a submission whose gallery entry
    /// never landed. Left alone when someone else has stamped it since.
    async fn release_submission(
        &self,
        user: &UserId,
        stamp: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) {
        let result = self
            .commit(user, |record| {
                if record.photo_submitted_at != Some(stamp) {
                    return Err(RewardError::NotEligible);
                }

                Ok((RecordPatch::restoring_photo_submission(previous), ()))
            })
            .await;

        match result {
            Ok(()) => info!("Released photo submission window of {user}"),
            Err(RewardError::NotEligible) => {
                debug!("Submission stamp of {user} changed, nothing to release")
            }
            Err(e) => warn!("Could not release photo submission window of {user}: {e}"),
        }
    }

    pub async fn claim_photo_reward(&self, now: DateTime<Utc>) -> Result<u64, RewardError> {
        let user = self.current_user()?;

        let result = self
            .commit(&user, |record| {
                availability::check_photo_claim(record, now)?;

                let points = record.awarded(PHOTO_AWARD)?;
                let patch = RecordPatch {
                    points: Some(points),
                    last_photo_earn_at: Some(now),
                    ..Default::default()
                };

                Ok((patch, points))
            })
            .await;

        if let Ok(points) = &result {
            info!("{user} claimed {PHOTO_AWARD} photo points, balance {points}");
        }
        report("photo reward claim", &user, result)
    }

    /// Newest first.
    pub async fn gallery(&self, limit: usize) -> Result<Vec<GalleryEntry>, RewardError> {
        self.current_user()?;

        let entries = self
            .store
            .list(&gallery_path(&self.settings.namespace))
            .await?;

        let mut gallery: Vec<GalleryEntry> = entries
            .iter()
            .filter_map(|(id, fields)| match GalleryEntry::from_fields(id, fields) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping malformed gallery entry {id}: {e}");
                    None
                }
            })
            .collect();

        gallery.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        gallery.truncate(limit);

        Ok(gallery)
    }

    async fn commit<T>(
        &self,
        user: &UserId,
        mut decide: impl FnMut(&RewardRecord) -> Result<(RecordPatch, T), RewardError>,
    ) -> Result<T, RewardError> {
        let path = record_path(&self.settings.namespace, user.as_str());

        for attempt in 1..=self.settings.max_attempts {
            let (revision, mut record) = match self.store.get_once(&path).await? {
                Some(document) => (
                    document.revision,
                    RewardRecord::from_fields(&document.fields)
                        .map_err(|e| RewardError::MalformedRecord(e.to_string()))?,
                ),
                None => (0, RewardRecord::default()),
            };

            let (patch, outcome) = decide(&record)?;

            match self
                .store
                .set_merge_if(&path, revision, patch.clone().into_fields())
                .await?
            {
                Some(committed) => {
                    record.merge(&patch);
                    apply_record(&self.state, user, committed, record, None);

                    return Ok(outcome);
                }
                None => debug!("Rewards of {user} changed during attempt {attempt}, retrying"),
            }
        }

        Err(RewardError::Conflict {
            attempts: self.settings.max_attempts,
        })
    }

    fn current_user(&self) -> Result<UserId, RewardError> {
        self.state
            .borrow()
            .user
            .clone()
            .ok_or(RewardError::AuthRequired)
    }

    fn cached_record(&self) -> RewardRecord {
        self.state.borrow().record.clone().unwrap_or_default()
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RewardManager {
    fn drop(&mut self) {
        self.lock_subscription().take();
    }
}

fn report<T>(
    action: &str,
    user: &UserId,
    result: Result<T, RewardError>,
) -> Result<T, RewardError> {
    if let Err(e) = &result {
        if e.is_fault() {
            warn!("{action} for {user} failed: {e}");
        } else {
            debug!("{action} for {user} rejected: {e}");
        }
    }

    result
}

fn apply_document(state: &watch::Sender<RewardState>, user: &UserId, document: Option<Document>) {
    let (revision, record) = match document {
        Some(document) => (document.revision, RewardRecord::from_fields(&document.fields)),
        None => (0, Ok(RewardRecord::default())),
    };

    match record {
        Ok(record) => apply_record(state, user, revision, record, Some(FeedStatus::Live)),
        Err(e) => {
            warn!("Malformed reward record for {user}: {e}");
            mark_unavailable(state, user);
        }
    }
}

fn apply_record(
    state: &watch::Sender<RewardState>,
    user: &UserId,
    revision: u64,
    record: RewardRecord,
    feed: Option<FeedStatus>,
) {
    state.send_if_modified(|current| {
        if current.user.as_ref() != Some(user) || revision < current.revision {
            return false;
        }

        let next = RewardState {
            user: Some(user.clone()),
            revision,
            record: Some(record),
            feed: feed.unwrap_or(current.feed),
        };

        if *current == next {
            return false;
        }

        *current = next;
        true
    });
}

fn mark_unavailable(state: &watch::Sender<RewardState>, user: &UserId) {
    state.send_if_modified(|current| {
        if current.user.as_ref() != Some(user) || current.feed == FeedStatus::Unavailable {
            return false;
        }

        current.record = None;
        current.feed = FeedStatus::Unavailable;
        true
    });
}
