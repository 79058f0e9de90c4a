//! # Redis
//!
//! Backs the reward documents and the gallery.
//!
//! ## Layout
//! - Document: one hash per path, e.g. `artifacts/app/users/{userId}/rewards/daily`
//! - Each hash field holds the JSON encoding of its value, `__revision` holds the revision
//! - Collection: entry hashes at `{collection}/{id}`, ids listed in order under `{collection}`
//!
//! ## Writes
//! - Merges run as one Lua script: compare revision, HSET fields, HINCRBY revision
//! - Redis runs scripts atomically, so two tabs can never both win a conditional merge
//! - Collection inserts go through a MULTI pipeline, entry and index land together
//!
//! ## Live Feeds
//! - Polled, each subscription checks its document every `REDIS_POLL_MS`
//! - Only revision changes are forwarded
//! - Errors are forwarded and polling goes on, the next good read is always sent
use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bank::{Document, DocumentStore, Feed, Fields, StoreError};
use redis::{
    AsyncCommands, Client, RedisError, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::{
    sync::mpsc::unbounded_channel,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;

pub const REVISION_FIELD: &str = "__revision";

const NO_REVISION: &str = "";

const MERGE_SCRIPT: &str = r"
local current = tonumber(redis.call('HGET', KEYS[1], '__revision') or '0')
if ARGV[1] ~= '' and current ~= tonumber(ARGV[1]) then
    return -1
end
for i = 2, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
return redis.call('HINCRBY', KEYS[1], '__revision', 1)
";

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, AppError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_secs(1));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis");

    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    poll: Duration,
    merge: Arc<Script>,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager, poll: Duration) -> Self {
        Self {
            connection,
            poll,
            merge: Arc::new(Script::new(MERGE_SCRIPT)),
        }
    }

    async fn read(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let mut connection = self.connection.clone();
        let hash: HashMap<String, String> =
            connection.hgetall(path).await.map_err(unavailable)?;

        decode_document(hash)
    }

    async fn merge(
        &self,
        path: &str,
        expected: Option<u64>,
        fields: &Fields,
    ) -> Result<Option<u64>, StoreError> {
        let mut connection = self.connection.clone();

        let mut invocation = self.merge.key(path);
        for arg in merge_args(expected, fields) {
            invocation.arg(arg);
        }

        let revision: i64 = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(unavailable)?;

        Ok(u64::try_from(revision).ok())
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get_once(&self, path: &str) -> Result<Option<Document>, StoreError> {
        self.read(path).await
    }

    async fn set_merge(&self, path: &str, fields: Fields) -> Result<u64, StoreError> {
        self.merge(path, None, &fields)
            .await?
            .ok_or_else(|| StoreError::Unavailable(format!("unconditional merge of {path} refused")))
    }

    async fn set_merge_if(
        &self,
        path: &str,
        expected: u64,
        fields: Fields,
    ) -> Result<Option<u64>, StoreError> {
        self.merge(path, Some(expected), &fields).await
    }

    async fn subscribe(&self, path: &str) -> Result<Feed, StoreError> {
        let initial = self.read(path).await?;
        let mut seen = initial.as_ref().map_or(0, |document| document.revision);

        let (sender, receiver) = unbounded_channel();
        let _ = sender.send(Ok(initial));

        let store = self.clone();
        let path = path.to_string();

        tokio::spawn(async move {
            let mut ticker = interval(store.poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            let mut failed = false;

            loop {
                tokio::select! {
                    _ = sender.closed() => break,
                    _ = ticker.tick() => {}
                }

                match store.read(&path).await {
                    Ok(document) => {
                        let revision = document.as_ref().map_or(0, |document| document.revision);
                        if revision == seen && !failed {
                            continue;
                        }

                        seen = revision;
                        failed = false;

                        if sender.send(Ok(document)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        failed = true;

                        if sender.send(Err(e)).is_err() {
                            break;
                        }
                    }
                }
            }

            debug!("Stopped polling {path}");
        });

        Ok(receiver)
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let key = format!("{collection}/{id}");

        let mut connection = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &encode_fields(&fields))
            .ignore()
            .rpush(collection, &id)
            .ignore()
            .query_async(&mut connection)
            .await
            .map_err(unavailable)?;

        Ok(id)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Fields)>, StoreError> {
        let mut connection = self.connection.clone();
        let ids: Vec<String> = connection
            .lrange(collection, 0, -1)
            .await
            .map_err(unavailable)?;

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let hash: HashMap<String, String> = connection
                .hgetall(format!("{collection}/{id}"))
                .await
                .map_err(unavailable)?;

            if hash.is_empty() {
                continue;
            }

            entries.push((id, decode_fields(hash)?));
        }

        Ok(entries)
    }
}

fn unavailable(e: RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

pub fn encode_fields(fields: &Fields) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect()
}

pub fn decode_fields(hash: HashMap<String, String>) -> Result<Fields, StoreError> {
    let fields = hash
        .into_iter()
        .map(|(name, raw)| serde_json::from_str(&raw).map(|value| (name, value)))
        .collect::<Result<Fields, serde_json::Error>>()?;

    Ok(fields)
}

pub fn decode_document(mut hash: HashMap<String, String>) -> Result<Option<Document>, StoreError> {
    if hash.is_empty() {
        return Ok(None);
    }

    let revision = match hash.remove(REVISION_FIELD) {
        Some(raw) => serde_json::from_str(&raw)?,
        None => 0,
    };

    Ok(Some(Document {
        revision,
        fields: decode_fields(hash)?,
    }))
}

/// `ARGV[1]` is the expected revision (empty for unconditional merges), then
/// field/value pairs.
pub fn merge_args(expected: Option<u64>, fields: &Fields) -> Vec<String> {
    let mut args = Vec::with_capacity(1 + fields.len() * 2);
    args.push(expected.map_or_else(|| NO_REVISION.to_string(), |revision| revision.to_string()));

    for (name, value) in encode_fields(fields) {
        args.push(name);
        args.push(value);
    }

    args
}
