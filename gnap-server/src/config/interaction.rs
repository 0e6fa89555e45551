use serde::Deserialize;

/// Configuration of the resource-owner interaction step
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InteractionConfig {
    /// Front-end page the interact endpoint redirects the resource owner to
    pub ui_url: String,

    /// How long a pending grant stays valid, in seconds (default: 10 minutes)
    pub window_secs: u64,

    /// Polling delay suggested to clients, in seconds (default: 5)
    pub wait_secs: u64,

    /// Bearer secret the front-end presents on the completion callback.
    /// When empty, every callback is rejected.
    pub callback_secret: String,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            ui_url: "http://localhost:7780/ui/consent".to_string(),
            window_secs: 600,
            wait_secs: 5,
            callback_secret: String::new(),
        }
    }
}

/// Configuration of issued access tokens
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of a token when no policy rule sets one, in seconds (default: 1 hour)
    pub default_ttl: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { default_ttl: 3600 }
    }
}
