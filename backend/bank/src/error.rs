use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Sign-in rejected: {0}")]
    Rejected(String),

    #[error("Identity provider unreachable: {0}")]
    Unreachable(String),
}

#[derive(Error, Debug)]
pub enum RewardError {
    #[error("Reward store unavailable: {0}")]
    StoreUnavailable(StoreError),

    #[error("Not eligible yet")]
    NotEligible,

    #[error("Photo reward already claimed")]
    AlreadyClaimed,

    #[error("No recent photo submission to claim rewards for")]
    NoRecentSubmission,

    #[error("File is too large ({size} bytes, max {max} bytes)")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("No photo selected")]
    NoPhotoSelected,

    #[error("Sign-in required")]
    AuthRequired,

    #[error("Malformed reward record: {0}")]
    MalformedRecord(String),

    #[error("Reward record kept changing, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Action already in progress")]
    ActionPending,
}

impl RewardError {
    /// Faults are worth a warning. Everything else is a rule rejection the
    /// user recovers from locally.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            RewardError::StoreUnavailable(_)
                | RewardError::MalformedRecord(_)
                | RewardError::Conflict { .. }
        )
    }
}

impl From<StoreError> for RewardError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Malformed(e) => RewardError::MalformedRecord(e.to_string()),
            unavailable => RewardError::StoreUnavailable(unavailable),
        }
    }
}
