use crate::errors::{ErrorResponse, GnapError};
use crate::gnap::parse_body;
use crate::grant::credential::AccessTokenValue;
use crate::grant::{token_key, AccessGrant};
use crate::models::{ClientRef, IntrospectRequest, IntrospectResponse};
use crate::openapi::GNAP_TAG;
use crate::state::AppState;
use crate::store::{Store, StoreBackend};
use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use log::debug;

/// Answers resource servers asking whether a token is active
pub struct IntrospectionHandler {
    store: Store,
}

impl IntrospectionHandler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn handle(&self, body: &[u8]) -> Result<IntrospectResponse, GnapError> {
        let request: IntrospectRequest = parse_body(body)?;

        let Some(presented) = request.access_token else {
            return Ok(IntrospectResponse::inactive());
        };
        let token = AccessTokenValue::parse(&presented)
            .ok_or_else(|| GnapError::invalid_request("malformed access token"))?;

        let grant: Option<AccessGrant> = self.store.get(&token_key(&token.digest())).await?;
        let grant = match grant {
            Some(grant) if grant.is_active(Utc::now()) => grant,
            Some(_) => {
                debug!("Introspected an expired token");
                return Ok(IntrospectResponse::inactive());
            }
            None => return Ok(IntrospectResponse::inactive()),
        };

        let (instance_id, key) = match grant.client {
            Some(ClientRef::Instance(instance_id)) => (Some(instance_id), None),
            Some(ClientRef::Client(client)) => (None, client.key),
            None => (None, None),
        };

        Ok(IntrospectResponse {
            active: true,
            access: Some(grant.access),
            label: grant.label,
            iat: Some(grant.issued_at.timestamp()),
            exp: grant.expires_at.map(|expires_at| expires_at.timestamp()),
            instance_id,
            key,
        })
    }
}

/// Introspect an access token
#[utoipa::path(
    post,
    path = "/gnap/introspect",
    tag = GNAP_TAG,
    request_body = IntrospectRequest,
    responses(
        (status = 200, description = "Token state", body = IntrospectResponse),
        (status = 400, description = "Empty or malformed request body", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub(crate) async fn introspect_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match state.operation.introspection_handler().handle(&body).await {
        Ok(introspection) => Json(introspection).into_response(),
        Err(err) => err.into_response(),
    }
}
