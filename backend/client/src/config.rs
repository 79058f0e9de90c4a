use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::AppError;

const SECRETS_DIR: &str = "/run/secrets";

pub struct Config {
    pub namespace: String,
    pub redis_url: String,
    pub redis_poll: Duration,
    pub tick: Duration,
    pub retry: Duration,
    pub write_attempts: u32,
    pub identity_url: String,
    pub identity_api_key: Option<String>,
    pub initial_auth_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        Self::from_sources(|key| env::var(key).ok(), read_secret)
    }

    pub fn from_sources(
        var: impl Fn(&str) -> Option<String>,
        secret: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let config = Self {
            namespace: try_load(&var, "APP_NAMESPACE", "artifacts/default-app-id")?,
            redis_url: try_load(&var, "REDIS_URL", "redis://127.0.0.1:6379")?,
            redis_poll: Duration::from_millis(try_load(&var, "REDIS_POLL_MS", "500")?),
            tick: Duration::from_millis(try_load(&var, "TICK_MS", "1000")?),
            retry: Duration::from_millis(try_load(&var, "RETRY_MS", "5000")?),
            write_attempts: try_load(&var, "WRITE_ATTEMPTS", "5")?,
            identity_url: try_load(&var, "IDENTITY_URL", "https://identitytoolkit.googleapis.com/v1")?,
            identity_api_key: secret("IDENTITY_API_KEY"),
            initial_auth_token: secret("INITIAL_AUTH_TOKEN"),
        };

        if config.namespace.trim_matches('/').is_empty() {
            return Err(AppError::Config("APP_NAMESPACE must not be empty".into()));
        }
        if config.tick.is_zero() || config.redis_poll.is_zero() || config.retry.is_zero() {
            return Err(AppError::Config(
                "TICK_MS, REDIS_POLL_MS and RETRY_MS must be positive".into(),
            ));
        }
        if config.write_attempts == 0 {
            return Err(AppError::Config("WRITE_ATTEMPTS must be at least 1".into()));
        }

        Ok(config)
    }
}

fn try_load<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, AppError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            AppError::Config(format!("invalid {key}: {e}"))
        })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("{SECRETS_DIR}/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("Secret {secret_name} not readable, skipping: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}
