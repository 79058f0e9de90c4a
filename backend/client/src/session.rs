//! # Session
//!
//! One signed in visitor, from sign-in until shutdown.
//!
//! ## Tasks
//! - Identity follower: re-attaches on a user change, detaches on sign-out, and
//!   retries every `RETRY_MS` while the signed in user has no reward feed
//! - Refresher: re-renders every `TICK_MS` and on every record change, never touches the store
//!
//! Both are aborted on shutdown, nothing renders after that.
use std::sync::Arc;

use bank::UserId;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use super::state::State;

pub struct Session {
    state: Arc<State>,
    follower: JoinHandle<()>,
    refresher: JoinHandle<()>,
}

impl Session {
    /// A failed sign-in or attach still starts the session, the view shows why.
    pub async fn start(state: Arc<State>) -> Self {
        let mut auth = state.identity.on_auth_change();

        if let Ok(user) = state.sign_in().await {
            attach(&state, user).await;
        }

        auth.borrow_and_update();
        state.render();

        let follower = tokio::spawn(follow_identity(state.clone(), auth));
        let refresher = tokio::spawn(refresh(state.clone()));

        info!("Session started");

        Self {
            state,
            follower,
            refresher,
        }
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn shutdown(self) {
        info!("Session shutting down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.follower.abort();
        self.refresher.abort();
        self.state.manager.detach();
    }
}

async fn attach(state: &State, user: UserId) {
    if let Err(e) = state.manager.attach(user).await {
        warn!("Rewards unavailable: {e}");
    }
}

async fn follow_identity(state: Arc<State>, mut auth: watch::Receiver<Option<UserId>>) {
    let mut retry = interval(state.config.retry);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
    retry.tick().await;

    loop {
        tokio::select! {
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }

                let user = auth.borrow_and_update().clone();
                match user {
                    Some(user) if state.manager.attached_user().as_ref() == Some(&user) => continue,
                    Some(user) => {
                        info!("Signed in as {user}, attaching");
                        attach(&state, user).await;
                    }
                    None => {
                        info!("Signed out, detaching");
                        state.manager.detach();
                    }
                }
            }
            _ = retry.tick() => {
                let user = auth.borrow().clone();
                match user {
                    Some(user) if state.manager.attached_user().is_none() => {
                        debug!("Retrying reward feed for {user}");
                        attach(&state, user).await;
                    }
                    _ => continue,
                }
            }
        }

        state.render();
    }

    debug!("Identity provider closed");
}

async fn refresh(state: Arc<State>) {
    let mut ticker = interval(state.config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut records = state.manager.listen();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = records.changed() => {
                if changed.is_err() {
                    break;
                }
                records.borrow_and_update();
            }
        }

        state.render();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bank::{
        DocumentStore, IdentityProvider, LocalIdentity, MemoryStore,
        clock::ManualClock,
        store::record_path,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        config::Config,
        view::{NOT_AVAILABLE, RewardView},
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
    }

    fn config(token: Option<&str>) -> Config {
        Config::from_sources(
            |key| matches!(key, "TICK_MS" | "RETRY_MS").then(|| "20".to_string()),
            |name| {
                (name == "INITIAL_AUTH_TOKEN")
                    .then(|| token.map(str::to_string))
                    .flatten()
            },
        )
        .unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        identity: Arc<LocalIdentity>,
        clock: Arc<ManualClock>,
        session: Session,
    }

    async fn start(token: Option<&str>) -> Fixture {
        start_with(Arc::new(MemoryStore::new()), token).await
    }

    async fn start_with(store: Arc<MemoryStore>, token: Option<&str>) -> Fixture {
        let identity = Arc::new(LocalIdentity::new());
        let clock = Arc::new(ManualClock::new(t0()));

        let state = State::with_parts(config(token), store.clone(), identity.clone(), clock.clone());
        let session = Session::start(state).await;

        Fixture {
            store,
            identity,
            clock,
            session,
        }
    }

    async fn wait_for(state: &State, check: impl Fn(&RewardView) -> bool) -> RewardView {
        let mut views = state.listen();

        timeout(Duration::from_secs(2), async {
            loop {
                let view = views.borrow_and_update().clone();
                if check(&view) {
                    return view;
                }

                views.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_signs_in_with_token() {
        let fixture = start(Some("visitor-1")).await;
        let view = fixture.session.state().listen().borrow().clone();

        assert_eq!(view.user.as_deref(), Some("visitor-1"));
        assert_eq!(view.points, Some(0));
        assert!(!view.daily.disabled);
        assert!(view.banner.is_none());
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_auth_banner() {
        let fixture = start(Some("   ")).await;
        let view = fixture.session.state().listen().borrow().clone();

        assert!(view.user.is_none());
        assert_eq!(view.points_label(), NOT_AVAILABLE);
        assert!(view.banner.is_some());
        assert!(view.daily.disabled);
    }

    #[tokio::test]
    async fn test_countdown_ticks_without_io() {
        let fixture = start(Some("visitor-1")).await;
        let state = fixture.session.state().clone();

        state.claim_daily().await.unwrap();
        assert_eq!(state.listen().borrow().daily.label, "Next claim in 1d");

        fixture.clock.advance(chrono::Duration::hours(1));
        wait_for(&state, |view| view.daily.label == "Next claim in 23h").await;

        fixture.clock.advance(chrono::Duration::hours(23));
        let view = wait_for(&state, |view| !view.daily.disabled).await;
        assert_eq!(view.points, Some(10));
    }

    #[tokio::test]
    async fn test_external_write_is_rendered() {
        let fixture = start(Some("visitor-1")).await;

        fixture
            .store
            .set_merge(
                &record_path(&fixture.session.state().config.namespace, "visitor-1"),
                json!({ "points": 70 }).as_object().unwrap().clone(),
            )
            .await
            .unwrap();

        wait_for(fixture.session.state(), |view| view.points == Some(70)).await;
    }

    #[tokio::test]
    async fn test_identity_changes_are_followed() {
        let fixture = start(Some("visitor-1")).await;
        let state = fixture.session.state().clone();

        fixture.identity.sign_out();
        let view = wait_for(&state, |view| view.user.is_none()).await;
        assert!(view.points.is_none());
        assert!(state.manager.attached_user().is_none());

        fixture.identity.sign_in_with_token("visitor-2").await.unwrap();
        let view = wait_for(&state, |view| view.points.is_some()).await;
        assert_eq!(view.user.as_deref(), Some("visitor-2"));
        assert_eq!(state.manager.attached_user(), Some(UserId::new("visitor-2")));
    }

    #[tokio::test]
    async fn test_feed_recovers_after_failed_attach() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);

        let fixture = start_with(store.clone(), Some("visitor-1")).await;
        let state = fixture.session.state().clone();
        assert!(state.manager.attached_user().is_none());
        assert!(state.listen().borrow().banner.is_some());

        store.set_offline(false);
        wait_for(&state, |view| view.points == Some(0) && view.banner.is_none()).await;
        assert_eq!(state.manager.attached_user(), Some(UserId::new("visitor-1")));

        store
            .set_merge(
                &record_path(&state.config.namespace, "visitor-1"),
                json!({ "points": 999 }).as_object().unwrap().clone(),
            )
            .await
            .unwrap();
        wait_for(&state, |view| view.points == Some(999)).await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_rendering() {
        let fixture = start(Some("visitor-1")).await;
        let state = fixture.session.state().clone();

        fixture.session.shutdown();
        assert!(state.manager.attached_user().is_none());

        let mut views = state.listen();
        views.borrow_and_update();

        fixture.clock.advance(chrono::Duration::hours(5));
        fixture
            .store
            .set_merge(
                &record_path(&state.config.namespace, "visitor-1"),
                json!({ "points": 5 }).as_object().unwrap().clone(),
            )
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        assert!(!views.has_changed().unwrap());
    }
}
