//! Documentation of a daily rewards client.
//!
//!
//!
//! # General Infrastructure
//! - Visitor signs in anonymously, or with a token when one is provisioned
//! - Reward record lives in Redis under `{APP_NAMESPACE}/users/{userId}/rewards/daily`
//! - Photo submissions land in the public gallery at `{APP_NAMESPACE}/public/gallery/photos`
//! - Several tabs or devices may run against the same record at once
//!
//!
//!
//! # Preventing Double Claims
//!
//! **Goal**: A claim is never lost and never counted twice, however many tabs race for it.
//!
//! - Every write re-reads the record and checks the cooldown against that fresh copy
//! - The merge only lands if the record still has the revision that was read
//! - A lost race retries from a fresh read, so the loser sees the winner's timestamp and is refused
//! - Within one session a control stays disabled while its action is in flight
//!
//!
//!
//! # Notes
//!
//! ## Cooldowns
//! All three windows are 24 hours, closed at the start and open at the end. A claim
//! exactly 24 hours after the previous one goes through.
//!
//! ## Live Updates
//! Redis has no document listeners, so subscriptions poll every `REDIS_POLL_MS` and only
//! forward revision changes. The countdowns re-render every `TICK_MS` without touching Redis.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run against a local Redis.
//! ```sh
//! RUST_LOG=info REDIS_URL=redis://127.0.0.1:6379 cargo run
//! ```
//!
//! Secrets are read from `/run/secrets`.
//! - `IDENTITY_API_KEY`: use the remote identity provider instead of local ids
//! - `INITIAL_AUTH_TOKEN`: sign in with this token instead of anonymously
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod identity;
pub mod session;
pub mod state;
pub mod utils;
pub mod view;

use config::Config;
use error::AppError;
use session::Session;
use state::State;
use view::{Notice, RewardView};

pub async fn start_client() -> Result<(), AppError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let config = Config::load()?;
    let state = State::new(config).await?;

    info!("Starting session...");
    let session = Session::start(state.clone()).await;

    tokio::select! {
        _ = log_changes(state.listen(), state.notices()) => {},
        _ = shutdown_signal() => {},
    }

    session.shutdown();

    println!("Client shutting down...");

    Ok(())
}

async fn log_changes(
    mut views: watch::Receiver<RewardView>,
    mut notices: watch::Receiver<Option<Notice>>,
) {
    log_view(&views.borrow_and_update());

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                log_view(&views.borrow_and_update());
            }
            changed = notices.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(notice) = notices.borrow_and_update().as_ref() {
                    info!("[{:?}] {}", notice.tone, notice.text);
                }
            }
        }
    }
}

fn log_view(view: &RewardView) {
    if let Some(banner) = &view.banner {
        info!("{banner}");
    }

    info!(
        "Points: {} | {} | {} | {}",
        view.points_label(),
        view.daily.label,
        view.submit_photo.label,
        view.claim_photo.label
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
