//! # Document Store
//!
//! Capability interface over the hosted document database. The reward core only
//! ever talks to this trait, adapters live next to whatever backs them.
//!
//! ## Paths
//! - Reward record: `{namespace}/users/{userId}/rewards/daily`
//! - Gallery collection: `{namespace}/public/gallery/photos`
//!
//! ## Revisions
//! Every document carries a revision bumped by the store on each write. A missing
//! document has revision 0. Conditional writes compare against it, which is what
//! keeps two tabs from both adding to the same stale balance.
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::StoreError;

pub type Fields = Map<String, Value>;

/// Live feed of one document. The first item is the current state, dropping the
/// receiver ends the subscription.
pub type Feed = UnboundedReceiver<Result<Option<Document>, StoreError>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub revision: u64,
    pub fields: Fields,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_once(&self, path: &str) -> Result<Option<Document>, StoreError>;

    async fn set_merge(&self, path: &str, fields: Fields) -> Result<u64, StoreError>;

    /// Merge only if the stored revision still equals `expected`. Returns the new
    /// revision, or `None` when someone else wrote first.
    async fn set_merge_if(
        &self,
        path: &str,
        expected: u64,
        fields: Fields,
    ) -> Result<Option<u64>, StoreError>;

    async fn subscribe(&self, path: &str) -> Result<Feed, StoreError>;

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Entries in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Fields)>, StoreError>;
}

pub fn record_path(namespace: &str, user_id: &str) -> String {
    format!("{namespace}/users/{user_id}/rewards/daily")
}

pub fn gallery_path(namespace: &str) -> String {
    format!("{namespace}/public/gallery/photos")
}
