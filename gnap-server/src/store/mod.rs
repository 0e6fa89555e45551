use crate::config::{StoreConfig, StoreKind};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to open store '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result of a write that only applies to an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The key existed and now holds the new value.
    Replaced,
    /// No value was stored under the key, nothing was written.
    Missing,
}

/// Key-value contract shared by all store backends.
///
/// Every operation is atomic at the level of a single key. `take` and
/// `replace` are the two read-modify-write primitives the grant lifecycle
/// relies on: `take` lets exactly one caller claim a record, `replace` never
/// recreates a record that somebody else already removed.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    /// Store a value under the key, overwriting any previous value.
    ///
    /// The record is evicted once `ttl` elapsed; `None` keeps it until it is
    /// deleted.
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Retrieve a value
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Atomically retrieve and delete a value
    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Overwrite a value only if the key is currently present, keeping the
    /// remaining lifetime of the record
    async fn replace<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<ReplaceOutcome, StoreError>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Checks that the backend is reachable
    async fn health_check(&self) -> Result<(), String>;
}

/// Concrete backend behind a [`Store`].
#[derive(Clone)]
pub enum Backend {
    /// In-memory store implementation using Moka
    InMemory(memory::InMemoryStore),
    /// Redis-based store implementation
    Redis(redis::RedisStore),
    /// Wrapper injecting write failures in tests
    #[cfg(test)]
    Faulty(crate::test_utils::FaultyStore),
}

/// Named collection handed out by a [`StoreProvider`].
///
/// Every call is bounded by the configured operation timeout. A timed out call
/// is reported as [`StoreError::Timeout`] and is never retried here.
#[derive(Clone)]
pub struct Store {
    backend: Backend,
    op_timeout: Duration,
}

impl Store {
    pub fn new(backend: Backend, op_timeout: Duration) -> Self {
        Self {
            backend,
            op_timeout,
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send,
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        tokio::time::timeout(self.op_timeout, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
    }
}

#[async_trait::async_trait]
impl StoreBackend for Store {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.bounded(async {
            match &self.backend {
                Backend::InMemory(store) => store.set(key, value, ttl).await,
                Backend::Redis(store) => store.set(key, value, ttl).await,
                #[cfg(test)]
                Backend::Faulty(store) => store.set(key, value, ttl).await,
            }
        })
        .await
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.bounded(async {
            match &self.backend {
                Backend::InMemory(store) => store.get(key).await,
                Backend::Redis(store) => store.get(key).await,
                #[cfg(test)]
                Backend::Faulty(store) => store.get(key).await,
            }
        })
        .await
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.bounded(async {
            match &self.backend {
                Backend::InMemory(store) => store.take(key).await,
                Backend::Redis(store) => store.take(key).await,
                #[cfg(test)]
                Backend::Faulty(store) => store.take(key).await,
            }
        })
        .await
    }

    async fn replace<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<ReplaceOutcome, StoreError> {
        self.bounded(async {
            match &self.backend {
                Backend::InMemory(store) => store.replace(key, value).await,
                Backend::Redis(store) => store.replace(key, value).await,
                #[cfg(test)]
                Backend::Faulty(store) => store.replace(key, value).await,
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(async {
            match &self.backend {
                Backend::InMemory(store) => store.delete(key).await,
                Backend::Redis(store) => store.delete(key).await,
                #[cfg(test)]
                Backend::Faulty(store) => store.delete(key).await,
            }
        })
        .await
    }

    async fn health_check(&self) -> Result<(), String> {
        match tokio::time::timeout(self.op_timeout, async {
            match &self.backend {
                Backend::InMemory(store) => store.health_check().await,
                Backend::Redis(store) => store.health_check().await,
                #[cfg(test)]
                Backend::Faulty(store) => store.health_check().await,
            }
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!(
                "Store health check timed out after {:?}",
                self.op_timeout
            )),
        }
    }
}

/// Opens named collections on a storage engine.
///
/// The server opens its collection once at startup; a failure there aborts
/// startup with the provider's error.
#[async_trait::async_trait]
pub trait StoreProvider: Send + Sync {
    async fn open_store(&self, name: &str) -> Result<Store, StoreError>;
}

/// Creates the store provider selected by the configuration.
pub fn create_store_provider(config: &StoreConfig) -> Result<Arc<dyn StoreProvider>, StoreError> {
    let op_timeout = Duration::from_millis(config.op_timeout_ms);
    match config.kind {
        StoreKind::InMemory => {
            let provider =
                memory::InMemoryStoreProvider::new(config.memory.capacity, op_timeout)
                    .map_err(StoreError::Config)?;
            Ok(Arc::new(provider))
        }
        StoreKind::Redis => {
            if config.redis.url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for Redis store".to_string(),
                ));
            }
            Ok(Arc::new(redis::RedisStoreProvider::new(
                &config.redis.url,
                op_timeout,
            )))
        }
    }
}
