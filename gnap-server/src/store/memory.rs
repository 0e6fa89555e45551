use super::{Backend, ReplaceOutcome, Store, StoreBackend, StoreError, StoreProvider};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

/// Serialized record together with its own lifetime
#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Option<Duration>,
    /// Set by `replace`: the entry inherits the remaining lifetime
    keep_ttl: bool,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            ttl,
            keep_ttl: false,
        }
    }

    fn keeping_ttl(value: String) -> Self {
        Self {
            value,
            ttl: None,
            keep_ttl: true,
        }
    }
}

/// Per-entry expiration driven by [`Entry::ttl`]
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        if entry.keep_ttl {
            duration_until_expiry
        } else {
            entry.ttl
        }
    }
}

/// One collection of the shared in-memory cache; keys are prefixed with the
/// collection name.
#[derive(Clone)]
pub struct InMemoryStore {
    cache: MokaCache<String, Entry>,
    namespace: String,
}

impl InMemoryStore {
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

fn decode<T: DeserializeOwned>(entry: Option<Entry>) -> Result<Option<T>, StoreError> {
    match entry {
        Some(entry) => serde_json::from_str(&entry.value)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
            .map(Some),
        None => Ok(None),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        self.cache
            .insert(self.key(key), Entry::new(serialized, ttl))
            .await;
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        decode(self.cache.get(&self.key(key)).await)
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        decode(self.cache.remove(&self.key(key)).await)
    }

    async fn replace<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<ReplaceOutcome, StoreError> {
        let serialized = serde_json::to_string(value)?;
        let result = self
            .cache
            .entry(self.key(key))
            .and_compute_with(move |entry| {
                let op = match entry {
                    Some(_) => Op::Put(Entry::keeping_ttl(serialized)),
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::ReplacedWith(_) => Ok(ReplaceOutcome::Replaced),
            _ => Ok(ReplaceOutcome::Missing),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.remove(&self.key(key)).await;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Provider backed by a single process-local Moka cache.
#[derive(Clone)]
pub struct InMemoryStoreProvider {
    cache: MokaCache<String, Entry>,
    op_timeout: Duration,
}

impl InMemoryStoreProvider {
    /// Initialize a new in-memory store provider
    pub fn new(capacity_mib: usize, op_timeout: Duration) -> Result<Self, String> {
        // Convert MiB to bytes for max_capacity (1 MiB = 1024 * 1024 bytes)
        let max_capacity_bytes: u64 = capacity_mib
            .checked_mul(1024 * 1024)
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or_else(|| format!("Store capacity of {capacity_mib} MiB overflows"))?;

        let cache = MokaCache::builder()
            .expire_after(EntryExpiry)
            .weigher(|key: &String, entry: &Entry| -> u32 {
                (key.len() + entry.value.len()).try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(max_capacity_bytes)
            .build();

        Ok(Self { cache, op_timeout })
    }
}

#[async_trait]
impl StoreProvider for InMemoryStoreProvider {
    async fn open_store(&self, name: &str) -> Result<Store, StoreError> {
        if name.is_empty() {
            return Err(StoreError::Config(
                "Store name must not be empty".to_string(),
            ));
        }
        let store = InMemoryStore {
            cache: self.cache.clone(),
            namespace: name.to_string(),
        };
        Ok(Store::new(Backend::InMemory(store), self.op_timeout))
    }
}
