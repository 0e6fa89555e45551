use serde::Deserialize;

/// Specifies which store implementation to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    InMemory,
    Redis,
}

/// Configuration for the grant store
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Store type: "in-memory" (default) or "redis"
    pub kind: StoreKind,

    /// Timeout applied to every store call, in milliseconds (default: 2000)
    pub op_timeout_ms: u64,

    /// In-memory store specific configuration
    pub memory: InMemoryConfig,

    /// Redis store specific configuration
    pub redis: RedisConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::InMemory,
            op_timeout_ms: 2000,
            memory: InMemoryConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

/// In-memory store configuration options
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Maximum capacity in MiB (default: 128 MiB)
    pub capacity: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 128, // 128 MiB
        }
    }
}

/// Redis store configuration options
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection string
    pub url: String,
}
