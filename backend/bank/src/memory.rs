//! In-process [`DocumentStore`]. Backs the tests and offline runs.
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use uuid::Uuid;

use crate::{
    error::StoreError,
    store::{Document, DocumentStore, Feed, Fields},
};

type Watcher = UnboundedSender<Result<Option<Document>, StoreError>>;

#[derive(Default)]
struct Inner {
    offline: bool,
    documents: HashMap<String, Document>,
    watchers: HashMap<String, Vec<Watcher>>,
    collections: HashMap<String, Vec<(String, Fields)>>,
}

impl Inner {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }

        Ok(())
    }

    fn merge(&mut self, path: &str, fields: Fields) -> u64 {
        let document = self
            .documents
            .entry(path.to_string())
            .or_insert_with(|| Document {
                revision: 0,
                fields: Fields::new(),
            });

        document.fields.extend(fields);
        document.revision += 1;

        let snapshot = document.clone();
        let revision = snapshot.revision;

        if let Some(watchers) = self.watchers.get_mut(path) {
            watchers.retain(|watcher| watcher.send(Ok(Some(snapshot.clone()))).is_ok());
        }

        revision
    }

    fn revision(&self, path: &str) -> u64 {
        self.documents.get(path).map_or(0, |document| document.revision)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with [`StoreError::Unavailable`] and live
    /// feeds receive that error once.
    pub fn set_offline(&self, offline: bool) {
        let mut inner = self.lock();
        inner.offline = offline;

        if offline {
            for watchers in inner.watchers.values_mut() {
                watchers.retain(|watcher| {
                    watcher
                        .send(Err(StoreError::Unavailable("memory store went offline".into())))
                        .is_ok()
                });
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_once(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.lock();
        inner.check_online()?;

        Ok(inner.documents.get(path).cloned())
    }

    async fn set_merge(&self, path: &str, fields: Fields) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        inner.check_online()?;

        Ok(inner.merge(path, fields))
    }

    async fn set_merge_if(
        &self,
        path: &str,
        expected: u64,
        fields: Fields,
    ) -> Result<Option<u64>, StoreError> {
        let mut inner = self.lock();
        inner.check_online()?;

        if inner.revision(path) != expected {
            return Ok(None);
        }

        Ok(Some(inner.merge(path, fields)))
    }

    async fn subscribe(&self, path: &str) -> Result<Feed, StoreError> {
        let mut inner = self.lock();
        inner.check_online()?;

        let (sender, receiver) = unbounded_channel();
        let current = inner.documents.get(path).cloned();

        if sender.send(Ok(current)).is_ok() {
            inner
                .watchers
                .entry(path.to_string())
                .or_default()
                .push(sender);
        }

        Ok(receiver)
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let mut inner = self.lock();
        inner.check_online()?;

        let id = Uuid::new_v4().simple().to_string();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), fields));

        Ok(id)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Fields)>, StoreError> {
        let inner = self.lock();
        inner.check_online()?;

        Ok(inner.collections.get(collection).cloned().unwrap_or_default())
    }
}
