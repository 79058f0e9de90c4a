//! # Bank
//!
//! Reward core shared by every frontend: the per-user reward record, the cooldown
//! arithmetic and the manager that claims against a document store.
//!
//! ## Rewards
//! - Daily claim: 10 points, once per 24 hours
//! - Photo submission: one photo per 24 hours, lands in the public gallery
//! - Photo claim: 50 points, needs a submission from the last 24 hours, once per 24 hours
//!
//! ## Collaborators
//! - [`store::DocumentStore`]: keyed documents with merge writes, revisions and live feeds
//! - [`identity::IdentityProvider`]: hands out a stable user id once signed in
//! - [`clock::Clock`]: wall time for the cooldowns
pub mod availability;
pub mod clock;
pub mod error;
pub mod identity;
pub mod manager;
pub mod memory;
pub mod record;
pub mod store;
pub mod utils;

pub use error::{AuthError, RewardError, StoreError};
pub use identity::{IdentityProvider, LocalIdentity, UserId};
pub use manager::{FeedStatus, RewardManager, RewardState, Settings};
pub use memory::MemoryStore;
pub use record::{GalleryEntry, PhotoFile, RewardRecord};
pub use store::{Document, DocumentStore, Feed, Fields};
