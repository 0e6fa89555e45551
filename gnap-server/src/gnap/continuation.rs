use crate::errors::{ErrorResponse, GnapError};
use crate::gnap::{issue_access_token, parse_body, token_expiry, GNAP_SCHEME};
use crate::grant::credential::{constant_time_eq, ContinuationCredential};
use crate::grant::{pending_key, AccessGrant, InteractionState, PendingGrant};
use crate::headers::presets;
use crate::models::{AccessToken, ContinueRequest, GrantResponse};
use crate::openapi::GNAP_TAG;
use crate::state::AppState;
use crate::store::{Store, StoreBackend};
use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, TimeDelta, Utc};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use log::{debug, error, info};

/// Finalizes pending grants once the resource owner approved them
pub struct ContinuationHandler {
    store: Store,
    default_ttl: Option<TimeDelta>,
}

impl ContinuationHandler {
    pub fn new(store: Store, default_ttl: Option<TimeDelta>) -> Self {
        Self { store, default_ttl }
    }

    /// Exchanges a continuation credential for an access token.
    ///
    /// Every reason to refuse a well-formed request yields the same
    /// `RequestDenied`, and a grant is finalized at most once: only the caller
    /// that removes the pending record issues a token.
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Result<GrantResponse, GnapError> {
        let presented = continuation_token(headers)?;
        let request: ContinueRequest = parse_body(body)?;

        let credential = ContinuationCredential::parse(presented)
            .ok_or_else(|| GnapError::denied("malformed continuation credential"))?;
        let key = pending_key(credential.grant_id());

        let pending: PendingGrant = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| GnapError::denied("no pending grant for credential"))?;

        if !credential.matches(&pending.continue_digest) {
            return Err(GnapError::denied("continuation secret mismatch"));
        }

        let now = Utc::now();
        if pending.is_expired(now) {
            self.store.delete(&key).await?;
            return Err(GnapError::denied(format!(
                "pending grant {} expired",
                pending.grant_id
            )));
        }

        if pending.state != InteractionState::Completed {
            return Err(GnapError::denied("interaction not completed"));
        }

        if pending.finish.is_some() {
            let expected = pending.interact_ref.as_deref().unwrap_or_default();
            let presented = request.interact_ref.as_deref().unwrap_or_default();
            if expected.is_empty() || !constant_time_eq(expected, presented) {
                return Err(GnapError::denied("interaction reference mismatch"));
            }
        }

        let expires_at = token_expiry(now, pending.expires_in, self.default_ttl)?;

        // Runs detached so that a dropped request cannot stop between
        // removing the pending grant and storing its token
        let finalization = tokio::spawn(finalize(self.store.clone(), key, now, expires_at));
        let access_token = finalization.await.map_err(|e| {
            error!("Grant finalization task failed: {e}");
            GnapError::internal(format!("finalization task failed: {e}"))
        })??;

        Ok(GrantResponse {
            access_token: Some(access_token),
            ..Default::default()
        })
    }
}

/// Claims the pending grant and issues its token.
///
/// Whoever removes the record owns the finalization; every other caller is
/// denied.
async fn finalize(
    store: Store,
    key: String,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<AccessToken, GnapError> {
    let Some(pending) = store.take::<PendingGrant>(&key).await? else {
        return Err(GnapError::denied("pending grant already finalized"));
    };

    let grant = AccessGrant {
        access: pending.access,
        label: pending.label,
        client: pending.client,
        issued_at,
        expires_at,
    };
    let access_token = issue_access_token(&store, grant).await?;
    info!("Finalized grant {}", pending.grant_id);
    Ok(access_token)
}

/// Credential from an `Authorization: GNAP <credential>` header
fn continuation_token(headers: &HeaderMap) -> Result<&str, GnapError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| GnapError::denied("missing Authorization header"))?;
    let header = header
        .to_str()
        .map_err(|_| GnapError::denied("Authorization header is not valid ASCII"))?;

    match header.split_once(' ') {
        Some((scheme, token)) if scheme == GNAP_SCHEME => Ok(token.trim()),
        _ => {
            debug!("Authorization header without GNAP scheme");
            Err(GnapError::denied("unsupported authorization scheme"))
        }
    }
}

/// Continue a pending grant
#[utoipa::path(
    post,
    path = "/gnap/continue",
    tag = GNAP_TAG,
    request_body = ContinueRequest,
    params(
        ("Authorization" = String, Header, description = "GNAP continuation credential"),
    ),
    responses(
        (status = 200, description = "Access token issued", body = GrantResponse),
        (status = 400, description = "Empty or malformed request body", body = ErrorResponse),
        (status = 401, description = "Request denied", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub(crate) async fn auth_continue_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state
        .operation
        .continuation_handler()
        .handle(&headers, &body)
        .await
    {
        Ok(grant) => {
            let mut response = Json(grant).into_response();
            presets::no_store().apply(&mut response);
            response
        }
        Err(err) => err.into_response(),
    }
}
