//! GNAP grant lifecycle: request, interaction, continuation and introspection.
//!
//! [`Operation`] owns one handler per step and binds them to their endpoints.
//! It holds no protocol logic of its own and no mutable state: everything that
//! outlives a single call lives in the grant store.

pub mod continuation;
pub mod interact;
pub mod introspection;
pub mod request;

use crate::config::{InteractionConfig, TokenConfig};
use crate::errors::GnapError;
use crate::grant::credential::AccessTokenValue;
use crate::grant::{checked_lifetime, token_key, AccessGrant, LifetimeError, GRANT_STORE_NAME};
use crate::interaction::InteractionHandler;
use crate::models::AccessToken;
use crate::policy::AccessPolicy;
use crate::state::AppState;
use crate::store::{Store, StoreBackend, StoreError, StoreProvider};
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use chrono::{DateTime, TimeDelta, Utc};
use http::Method;
use log::debug;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub const AUTH_REQUEST_PATH: &str = "/gnap/auth";
pub const AUTH_CONTINUE_PATH: &str = "/gnap/continue";
pub const INTERACT_PATH: &str = "/gnap/interact";
pub const INTERACT_COMPLETE_PATH: &str = "/gnap/interact/complete";
pub const INTROSPECT_PATH: &str = "/gnap/introspect";

/// Authorization scheme of continuation credentials
pub const GNAP_SCHEME: &str = "GNAP";

/// Errors raised while building an [`Operation`]
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Failed to open grant store: {0}")]
    OpenStore(#[source] StoreError),
    #[error("Invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid {setting}: {source}")]
    InvalidLifetime {
        setting: &'static str,
        #[source]
        source: LifetimeError,
    },
}

/// Collaborators and settings an [`Operation`] is built from
#[derive(Clone)]
pub struct GnapConfig {
    pub store_provider: Arc<dyn StoreProvider>,
    pub access_policy: Arc<dyn AccessPolicy>,
    pub base_url: String,
    pub interaction_handler: Arc<dyn InteractionHandler>,
    pub interaction: InteractionConfig,
    pub token: TokenConfig,
}

/// One endpoint served by the façade
pub struct RestHandler {
    pub path: &'static str,
    pub method: Method,
    pub handler: MethodRouter<AppState>,
}

impl RestHandler {
    fn new(path: &'static str, method: Method, handler: MethodRouter<AppState>) -> Self {
        Self {
            path,
            method,
            handler,
        }
    }
}

/// Façade binding the grant lifecycle handlers to their endpoints
pub struct Operation {
    request: request::GrantRequestHandler,
    continuation: continuation::ContinuationHandler,
    interaction: interact::InteractionCompletion,
    introspection: introspection::IntrospectionHandler,
    interaction_handler: Arc<dyn InteractionHandler>,
    store: Store,
}

impl Operation {
    /// Builds every handler, opening the grant store first.
    ///
    /// Fails without returning anything when the store cannot be opened; the
    /// provider's error is kept as the source.
    pub async fn new(config: GnapConfig) -> Result<Self, OperationError> {
        let window = checked_lifetime(config.interaction.window_secs).map_err(|source| {
            OperationError::InvalidLifetime {
                setting: "interaction.window_secs",
                source,
            }
        })?;
        let default_token_ttl = default_token_lifetime(&config.token)?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|source| OperationError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;

        let store = config
            .store_provider
            .open_store(GRANT_STORE_NAME)
            .await
            .map_err(OperationError::OpenStore)?;

        let grant_uri = format!("{base_url}{AUTH_REQUEST_PATH}");
        let continue_uri = format!("{base_url}{AUTH_CONTINUE_PATH}");

        Ok(Self {
            request: request::GrantRequestHandler::new(
                store.clone(),
                config.access_policy,
                config.interaction_handler.clone(),
                continue_uri,
                window,
                config.interaction.wait_secs,
                default_token_ttl,
            ),
            continuation: continuation::ContinuationHandler::new(store.clone(), default_token_ttl),
            interaction: interact::InteractionCompletion::new(
                store.clone(),
                config.interaction_handler.clone(),
                grant_uri,
            ),
            introspection: introspection::IntrospectionHandler::new(store.clone()),
            interaction_handler: config.interaction_handler,
            store,
        })
    }

    /// Operation backed by an in-memory store and a policy that denies everything
    #[cfg(test)]
    pub async fn for_testing() -> Self {
        Self::new(crate::test_utils::test_gnap_config(
            crate::policy::RulePolicy::deny_all(),
        ))
        .await
        .expect("Failed to build test operation")
    }

    pub fn request_handler(&self) -> &request::GrantRequestHandler {
        &self.request
    }

    pub fn continuation_handler(&self) -> &continuation::ContinuationHandler {
        &self.continuation
    }

    pub fn introspection_handler(&self) -> &introspection::IntrospectionHandler {
        &self.introspection
    }

    pub fn interaction_handler(&self) -> &dyn InteractionHandler {
        self.interaction_handler.as_ref()
    }

    /// Records the resource owner's decision for the pending grant `txn_id`
    pub async fn complete_interaction(
        &self,
        txn_id: &str,
        approved: bool,
    ) -> Result<Option<Url>, GnapError> {
        self.interaction.complete(txn_id, approved).await
    }

    /// Checks that the grant store is reachable
    pub async fn health_check(&self) -> Result<(), String> {
        self.store.health_check().await
    }

    /// The four public GNAP endpoints
    pub fn rest_handlers() -> Vec<RestHandler> {
        vec![
            RestHandler::new(
                AUTH_REQUEST_PATH,
                Method::POST,
                post(request::auth_request_handler),
            ),
            RestHandler::new(INTERACT_PATH, Method::GET, get(interact::interact_handler)),
            RestHandler::new(
                AUTH_CONTINUE_PATH,
                Method::POST,
                post(continuation::auth_continue_handler),
            ),
            RestHandler::new(
                INTROSPECT_PATH,
                Method::POST,
                post(introspection::introspect_handler),
            ),
        ]
    }

    /// Router serving [`Operation::rest_handlers`]
    pub fn router() -> Router<AppState> {
        Self::rest_handlers()
            .into_iter()
            .fold(Router::new(), |router, rest| {
                debug!("Registering GNAP endpoint {} {}", rest.method, rest.path);
                router.route(rest.path, rest.handler)
            })
    }
}

/// Parses a JSON request body; an empty or malformed body is the client's fault
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, GnapError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GnapError::invalid_request("empty request body"));
    }
    serde_json::from_slice(body)
        .map_err(|e| GnapError::invalid_request(format!("malformed request body: {e}")))
}

/// Persists a finalized grant under a fresh token and returns the token
pub(crate) async fn issue_access_token(
    store: &Store,
    grant: AccessGrant,
) -> Result<AccessToken, GnapError> {
    let token = AccessTokenValue::generate();
    store
        .set(&token_key(&token.digest()), &grant, grant.store_ttl())
        .await?;

    Ok(AccessToken {
        value: token.into_inner(),
        label: grant.label.clone(),
        expires_in: grant.expires_in(),
        access: grant.access,
    })
}

/// Lifetime of tokens whose rights set none; zero issues tokens without expiry
fn default_token_lifetime(config: &TokenConfig) -> Result<Option<TimeDelta>, OperationError> {
    if config.default_ttl == 0 {
        return Ok(None);
    }
    checked_lifetime(config.default_ttl)
        .map(Some)
        .map_err(|source| OperationError::InvalidLifetime {
            setting: "token.default_ttl",
            source,
        })
}

/// Expiry of a token issued at `now`: the policy's lifetime when it set one,
/// else the configured default.
pub(crate) fn token_expiry(
    now: DateTime<Utc>,
    policy_expiry: Option<u64>,
    default_lifetime: Option<TimeDelta>,
) -> Result<Option<DateTime<Utc>>, GnapError> {
    let lifetime = match policy_expiry {
        Some(secs) => Some(
            checked_lifetime(secs)
                .map_err(|e| GnapError::internal(format!("policy token lifetime: {e}")))?,
        ),
        None => default_lifetime,
    };

    lifetime
        .map(|lifetime| {
            now.checked_add_signed(lifetime)
                .ok_or_else(|| GnapError::internal("token expiry out of range"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RulePolicy;
    use crate::test_utils::{test_gnap_config, FailingStoreProvider};

    #[tokio::test]
    async fn test_new_success() {
        let operation = Operation::new(test_gnap_config(RulePolicy::deny_all())).await;
        assert!(operation.is_ok());
        assert!(operation.unwrap().health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_new_propagates_store_open_error() {
        let mut config = test_gnap_config(RulePolicy::deny_all());
        config.store_provider = Arc::new(FailingStoreProvider);

        let err = match Operation::new(config).await {
            Ok(_) => panic!("expected Operation::new to fail"),
            Err(err) => err,
        };

        assert!(matches!(err, OperationError::OpenStore(_)));
        // The provider's error is reachable, unchanged, through the source chain
        let store_error = std::error::Error::source(&err).expect("missing store error");
        let original =
            std::error::Error::source(store_error).expect("missing original error");
        assert!(original
            .downcast_ref::<crate::test_utils::ExpectedError>()
            .is_some());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_base_url() {
        let mut config = test_gnap_config(RulePolicy::deny_all());
        config.base_url = "example.com".to_string();

        let result = Operation::new(config).await;
        assert!(matches!(result, Err(OperationError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_rest_handlers() {
        let handlers = Operation::rest_handlers();
        assert_eq!(handlers.len(), 4);

        let routes: Vec<(&str, Method)> = handlers
            .iter()
            .map(|h| (h.path, h.method.clone()))
            .collect();
        assert!(routes.contains(&(AUTH_REQUEST_PATH, Method::POST)));
        assert!(routes.contains(&(INTERACT_PATH, Method::GET)));
        assert!(routes.contains(&(AUTH_CONTINUE_PATH, Method::POST)));
        assert!(routes.contains(&(INTROSPECT_PATH, Method::POST)));
    }

    #[test]
    fn test_parse_body() {
        assert!(matches!(
            parse_body::<serde_json::Value>(b""),
            Err(GnapError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_body::<serde_json::Value>(b"  \n"),
            Err(GnapError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_body::<serde_json::Value>(b"{not json"),
            Err(GnapError::InvalidRequest(_))
        ));
        assert!(parse_body::<serde_json::Value>(b"{}").is_ok());
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let hour = Some(TimeDelta::seconds(3600));

        assert_eq!(
            token_expiry(now, Some(60), hour).unwrap(),
            Some(now + TimeDelta::seconds(60))
        );
        assert_eq!(
            token_expiry(now, None, hour).unwrap(),
            Some(now + TimeDelta::seconds(3600))
        );
        assert_eq!(token_expiry(now, None, None).unwrap(), None);

        // Out of range lifetimes from a policy fail the request instead of
        // wrapping around or panicking
        for secs in [0, u64::MAX, 10_000_000_000_000_000] {
            assert!(matches!(
                token_expiry(now, Some(secs), hour),
                Err(GnapError::Internal(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_new_rejects_unusable_lifetimes() {
        for window_secs in [0, u64::MAX, 10_000_000_000_000_000] {
            let mut config = test_gnap_config(RulePolicy::deny_all());
            config.interaction.window_secs = window_secs;
            let result = Operation::new(config).await;
            assert!(matches!(
                result,
                Err(OperationError::InvalidLifetime {
                    setting: "interaction.window_secs",
                    ..
                })
            ));
        }

        for default_ttl in [u64::MAX, 10_000_000_000_000_000] {
            let mut config = test_gnap_config(RulePolicy::deny_all());
            config.token.default_ttl = default_ttl;
            let result = Operation::new(config).await;
            assert!(matches!(
                result,
                Err(OperationError::InvalidLifetime {
                    setting: "token.default_ttl",
                    ..
                })
            ));
        }

        let mut config = test_gnap_config(RulePolicy::deny_all());
        config.token.default_ttl = 0;
        assert!(Operation::new(config).await.is_ok());
    }
}
