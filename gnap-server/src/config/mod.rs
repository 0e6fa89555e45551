pub(crate) use crate::config::interaction::{InteractionConfig, TokenConfig};
pub(crate) use crate::config::policy::{AccessRule, Permission, PolicyConfig};
pub(crate) use crate::config::store::{StoreConfig, StoreKind};
use config::builder::DefaultState;
use config::{Config as ConfigCrate, ConfigBuilder, ConfigError};
use serde::Deserialize;

pub mod interaction;
pub mod policy;
pub mod store;

/// Environment variable pointing at an optional configuration file
pub const CONFIG_FILE_ENV: &str = "GNAP_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "gnap.toml";

/// Main configuration structure for the GNAP server
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// The port the server will listen to (default: 7780)
    pub port: u16,

    /// Public base URL of this server, used to build continue and interact URIs
    pub base_url: String,

    /// Grant store configuration
    pub store: StoreConfig,

    /// Resource-owner interaction configuration
    pub interaction: InteractionConfig,

    /// Issued access token configuration
    pub token: TokenConfig,

    /// Access policy rules
    pub policy: PolicyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 7780,
            base_url: "http://localhost:7780".to_string(),
            store: StoreConfig::default(),
            interaction: InteractionConfig::default(),
            token: TokenConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl Settings {
    /// Loads the configuration file (if any) and `GNAP_` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `GNAP_STORE__KIND=redis`.
    pub fn new() -> Result<Self, String> {
        let path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Self::build(
            ConfigCrate::builder()
                .add_source(config::File::with_name(&path).required(false))
                .add_source(Self::environment()),
        )
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("GNAP")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, String> {
        builder
            .build()
            .map_err(|e: ConfigError| e.to_string())?
            .try_deserialize()
            .map_err(|e| e.to_string())
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0, // Let the OS choose a port
            base_url: "https://as.example.com".to_string(),
            interaction: InteractionConfig {
                ui_url: "https://as.example.com/ui/consent".to_string(),
                callback_secret: "test-callback-secret".to_string(),
                ..Default::default()
            },
            store: StoreConfig {
                op_timeout_ms: 1000,
                ..Default::default()
            },
            policy: crate::policy::tests::test_policy_config(),
            ..Default::default()
        }
    }
}
