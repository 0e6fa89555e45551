use axum::http::HeaderValue;
use http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};

/// Cache-Control directives
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    pub no_cache: bool,
    pub no_store: bool,
    pub must_revalidate: bool,
}

impl CacheControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set no-store directive
    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    /// Convert to HeaderValue
    pub fn to_header_value(&self) -> HeaderValue {
        let mut parts = Vec::new();

        if self.no_cache {
            parts.push("no-cache");
        }
        if self.no_store {
            parts.push("no-store");
        }
        if self.must_revalidate {
            parts.push("must-revalidate");
        }

        HeaderValue::from_str(&parts.join(", ")).unwrap_or(HeaderValue::from_static(""))
    }
}

/// Helper struct for setting cache-related headers
#[derive(Debug, Clone, Default)]
pub struct CacheHeaders {
    cache_control: CacheControl,
}

impl CacheHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cache control directives
    pub fn cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    /// Apply headers to a response
    pub fn apply<B>(&self, response: &mut axum::response::Response<B>) {
        let headers = response.headers_mut();

        headers.insert(CACHE_CONTROL, self.cache_control.to_header_value());

        // HTTP/1.0 caches only understand Pragma
        if self.cache_control.no_store || self.cache_control.no_cache {
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(EXPIRES, HeaderValue::from_static("0"));
        }
    }
}

/// Common cache control presets
pub mod presets {
    use super::*;

    /// Responses carrying credentials must never be stored
    pub fn no_store() -> CacheHeaders {
        CacheHeaders::new().cache_control(CacheControl::new().no_store())
    }
}
