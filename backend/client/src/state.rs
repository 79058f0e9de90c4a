use std::{
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use bank::{
    AuthError, DocumentStore, GalleryEntry, IdentityProvider, LocalIdentity, PhotoFile,
    RewardError, RewardManager, Settings, UserId,
    clock::{Clock, SystemClock},
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info};

use super::{
    config::Config,
    database::{RedisStore, init_redis},
    error::AppError,
    identity::RemoteIdentity,
    view::{Action, Notice, Pending, RewardView, render},
};

pub struct State {
    pub config: Config,
    pub manager: Arc<RewardManager>,
    pub identity: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
    selection: Mutex<Option<PhotoFile>>,
    in_flight: InFlight,
    view: watch::Sender<RewardView>,
    notice: watch::Sender<Option<Notice>>,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let connection = init_redis(&config.redis_url).await?;
        let store = Arc::new(RedisStore::new(connection, config.redis_poll));

        let identity: Arc<dyn IdentityProvider> = match &config.identity_api_key {
            Some(api_key) => {
                info!("Using remote identity at {}", config.identity_url);
                Arc::new(RemoteIdentity::new(&config.identity_url, api_key))
            }
            None => {
                info!("IDENTITY_API_KEY not set, using local identity");
                Arc::new(LocalIdentity::new())
            }
        };

        Ok(Self::with_parts(config, store, identity, Arc::new(SystemClock)))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let manager = RewardManager::new(
            store,
            Settings {
                namespace: config.namespace.clone(),
                max_attempts: config.write_attempts,
            },
        );

        let (view, _) = watch::channel(RewardView::default());
        let (notice, _) = watch::channel(None);

        let state = Arc::new(Self {
            config,
            manager: Arc::new(manager),
            identity,
            clock,
            selection: Mutex::new(None),
            in_flight: InFlight::default(),
            view,
            notice,
        });
        state.render();

        state
    }

    pub fn listen(&self) -> watch::Receiver<RewardView> {
        self.view.subscribe()
    }

    pub fn notices(&self) -> watch::Receiver<Option<Notice>> {
        self.notice.subscribe()
    }

    /// Recomputes the view from the cached record and the clock. No I/O.
    pub fn render(&self) -> RewardView {
        let view = render(
            &self.manager.snapshot(),
            self.clock.now(),
            self.in_flight.pending(),
            self.lock_selection().as_ref(),
        );

        self.view.send_if_modified(|current| {
            if *current == view {
                return false;
            }

            *current = view.clone();
            true
        });

        view
    }

    pub fn select_photo(&self, file: Option<PhotoFile>) {
        *self.lock_selection() = file;
        self.render();
    }

    /// Token sign-in when one is configured, anonymous otherwise.
    pub async fn sign_in(&self) -> Result<UserId, AuthError> {
        let result = match &self.config.initial_auth_token {
            Some(token) => self.identity.sign_in_with_token(token).await,
            None => self.identity.sign_in_anonymous().await,
        };

        result.inspect_err(|e| error!("Sign-in failed: {e}"))
    }

    pub async fn claim_daily(&self) -> Result<u64, RewardError> {
        self.run(Action::ClaimDaily, |now| self.manager.claim_daily(now))
            .await
    }

    /// Submits the selected photo and clears the selection once it is in.
    pub async fn submit_photo(&self) -> Result<GalleryEntry, RewardError> {
        let file = self.lock_selection().clone();

        let result = self
            .run(Action::SubmitPhoto, |now| async move {
                let file = file.ok_or(RewardError::NoPhotoSelected)?;

                self.manager.submit_photo(now, &file).await
            })
            .await;

        if result.is_ok() {
            self.select_photo(None);
        }

        result
    }

    pub async fn claim_photo_reward(&self) -> Result<u64, RewardError> {
        self.run(Action::ClaimPhoto, |now| self.manager.claim_photo_reward(now))
            .await
    }

    async fn run<T, F, Fut>(&self, action: Action, operation: F) -> Result<T, RewardError>
    where
        F: FnOnce(DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<T, RewardError>>,
    {
        let guard = self.in_flight.begin(action)?;
        self.render();

        let result = operation(self.clock.now()).await;

        drop(guard);
        self.notice
            .send_replace(Some(Notice::from_outcome(action, &result)));
        self.render();

        result
    }

    fn lock_selection(&self) -> MutexGuard<'_, Option<PhotoFile>> {
        self.selection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Default)]
struct InFlight {
    daily: AtomicBool,
    submit_photo: AtomicBool,
    claim_photo: AtomicBool,
}

impl InFlight {
    fn flag(&self, action: Action) -> &AtomicBool {
        match action {
            Action::ClaimDaily => &self.daily,
            Action::SubmitPhoto => &self.submit_photo,
            Action::ClaimPhoto => &self.claim_photo,
        }
    }

    fn begin(&self, action: Action) -> Result<PendingGuard<'_>, RewardError> {
        let flag = self.flag(action);

        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RewardError::ActionPending)?;

        Ok(PendingGuard { flag })
    }

    fn pending(&self) -> Pending {
        Pending {
            daily: self.daily.load(Ordering::Acquire),
            submit_photo: self.submit_photo.load(Ordering::Acquire),
            claim_photo: self.claim_photo.load(Ordering::Acquire),
        }
    }
}

/// Clears its flag when dropped, whichever way the action ends.
struct PendingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
