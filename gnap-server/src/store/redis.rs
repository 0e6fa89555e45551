use super::{Backend, ReplaceOutcome, Store, StoreBackend, StoreError, StoreProvider};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
    namespace: String,
}

impl RedisStore {
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

/// Whole seconds for `SETEX`, rounded up. Redis rejects a zero expiry.
fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        let result = match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(self.key(key), serialized, expiry_secs(ttl))
                    .await
            }
            None => conn.set::<_, _, ()>(self.key(key), serialized).await,
        };
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while setting key {}: {}", key, err);
                Err(StoreError::Redis(err.to_string()))
            }
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = match conn.get(self.key(key)).await {
            Ok(value) => value,
            Err(err) => {
                if err.kind() == redis::ErrorKind::TypeError {
                    // Key doesn't exist
                    return Ok(None);
                }
                error!("Redis error while getting key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };

        if let Some(value) = result {
            serde_json::from_str(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some)
        } else {
            Ok(None)
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();

        // GETDEL is a single command, so only one caller can observe the value
        let result: Option<String> = match redis::cmd("GETDEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while taking key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };

        if let Some(value) = result {
            serde_json::from_str(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some)
        } else {
            Ok(None)
        }
    }

    async fn replace<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<ReplaceOutcome, StoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = match redis::cmd("SET")
            .arg(self.key(key))
            .arg(serialized)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while replacing key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };

        Ok(match result {
            Some(_) => ReplaceOutcome::Replaced,
            None => ReplaceOutcome::Missing,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();

        match conn.del::<_, ()>(self.key(key)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while deleting key {}: {}", key, err);
                Err(StoreError::Redis(err.to_string()))
            }
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }
}

/// Provider that opens collections on a Redis server.
///
/// The connection is established when a collection is opened, so an
/// unreachable server is reported by `open_store`.
#[derive(Clone, Debug)]
pub struct RedisStoreProvider {
    redis_url: String,
    op_timeout: Duration,
}

impl RedisStoreProvider {
    pub fn new(redis_url: &str, op_timeout: Duration) -> Self {
        Self {
            redis_url: redis_url.to_string(),
            op_timeout,
        }
    }
}

#[async_trait]
impl StoreProvider for RedisStoreProvider {
    async fn open_store(&self, name: &str) -> Result<Store, StoreError> {
        let open_error = |err: redis::RedisError| StoreError::Open {
            name: name.to_string(),
            source: Box::new(err),
        };

        let client = Client::open(self.redis_url.as_str()).map_err(open_error)?;
        let conn_manager = ConnectionManager::new(client).await.map_err(open_error)?;

        // Test the connection to ensure it's working
        let mut conn = conn_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(open_error)?;

        let store = RedisStore {
            conn_manager,
            namespace: name.to_string(),
        };
        Ok(Store::new(Backend::Redis(store), self.op_timeout))
    }
}
