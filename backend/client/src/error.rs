use bank::{AuthError, RewardError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Misconfigured: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Reward(#[from] RewardError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
