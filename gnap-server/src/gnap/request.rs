use crate::errors::{ErrorResponse, GnapError};
use crate::gnap::{issue_access_token, parse_body, token_expiry};
use crate::grant::credential::{generate_nonce, ContinuationCredential, GrantId};
use crate::grant::{pending_key, AccessGrant, InteractionState, PendingGrant};
use crate::headers::presets;
use crate::interaction::{validate_finish, InteractionHandler};
use crate::models::{
    AccessDescriptor, ContinueInfo, ContinueToken, GrantRequest, GrantResponse,
    InteractResponse,
};
use crate::openapi::GNAP_TAG;
use crate::policy::{AccessPolicy, Outcome};
use crate::state::AppState;
use crate::store::{Store, StoreBackend};
use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use chrono::{TimeDelta, Utc};
use log::{debug, info};
use std::sync::Arc;

/// Entry point of the grant lifecycle
pub struct GrantRequestHandler {
    store: Store,
    policy: Arc<dyn AccessPolicy>,
    interaction: Arc<dyn InteractionHandler>,
    continue_uri: String,
    window: TimeDelta,
    wait_secs: u64,
    default_token_ttl: Option<TimeDelta>,
}

impl GrantRequestHandler {
    pub fn new(
        store: Store,
        policy: Arc<dyn AccessPolicy>,
        interaction: Arc<dyn InteractionHandler>,
        continue_uri: String,
        window: TimeDelta,
        wait_secs: u64,
        default_token_ttl: Option<TimeDelta>,
    ) -> Self {
        Self {
            store,
            policy,
            interaction,
            continue_uri,
            window,
            wait_secs,
            default_token_ttl,
        }
    }

    /// Evaluates a grant request and either issues a token right away or
    /// stores a pending grant waiting for the resource owner.
    ///
    /// Nothing is written when the request is denied.
    pub async fn handle(&self, body: &[u8]) -> Result<GrantResponse, GnapError> {
        let request: GrantRequest = parse_body(body)?;

        if let Some(finish) = request.interact.as_ref().and_then(|i| i.finish.as_ref()) {
            validate_finish(finish).map_err(GnapError::invalid_request)?;
        }

        let decision = self
            .policy
            .evaluate(&request)
            .map_err(|e| GnapError::denied(format!("policy rejected the request: {e}")))?;

        match decision.outcome {
            Outcome::Denied => Err(GnapError::denied("policy denied the requested access")),
            Outcome::Approved => {
                let now = Utc::now();
                let expires_at =
                    token_expiry(now, decision.expires_in, self.default_token_ttl)?;
                let grant = AccessGrant {
                    access: decision.access,
                    label: label_of(&request),
                    client: request.client,
                    issued_at: now,
                    expires_at,
                };

                let access_token = issue_access_token(&self.store, grant).await?;
                info!("Issued access token without interaction");
                Ok(GrantResponse {
                    access_token: Some(access_token),
                    ..Default::default()
                })
            }
            Outcome::RequiresInteraction => {
                self.start_interaction(request, decision.access, decision.expires_in)
                    .await
            }
        }
    }

    async fn start_interaction(
        &self,
        request: GrantRequest,
        access: Vec<AccessDescriptor>,
        expires_in: Option<u64>,
    ) -> Result<GrantResponse, GnapError> {
        let label = label_of(&request);
        let interact = match request.interact {
            Some(interact) if interact.supports_redirect() => interact,
            _ => {
                return Err(GnapError::denied(
                    "interaction required but the client cannot redirect",
                ))
            }
        };

        let grant_id = GrantId::generate();
        let credential = ContinuationCredential::issue(grant_id.clone());
        let server_nonce = generate_nonce();

        // The redirect must exist before the grant is persisted
        let redirect = self
            .interaction
            .prepare_interaction(&grant_id)
            .map_err(GnapError::internal)?;

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.window)
            .ok_or_else(|| GnapError::internal("interaction window out of range"))?;
        let pending = PendingGrant {
            grant_id: grant_id.to_string(),
            continue_digest: credential.secret_digest(),
            access,
            label,
            client: request.client,
            expires_in,
            finish: interact.finish.clone(),
            server_nonce: server_nonce.clone(),
            state: InteractionState::Pending,
            interact_ref: None,
            created_at: now,
            expires_at,
        };
        self.store
            .set(&pending_key(&grant_id), &pending, Some(pending.store_ttl()))
            .await?;
        debug!("Stored pending grant {grant_id}");

        Ok(GrantResponse {
            continue_info: Some(ContinueInfo {
                access_token: ContinueToken {
                    value: credential.value(),
                },
                uri: self.continue_uri.clone(),
                wait: Some(self.wait_secs),
            }),
            interact: Some(InteractResponse {
                redirect: redirect.to_string(),
                finish: interact.finish.is_some().then_some(server_nonce),
            }),
            access_token: None,
        })
    }
}

fn label_of(request: &GrantRequest) -> Option<String> {
    request
        .access_token
        .as_ref()
        .and_then(|token| token.label.clone())
}

/// Request a grant
#[utoipa::path(
    post,
    path = "/gnap/auth",
    tag = GNAP_TAG,
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Access token issued or interaction started", body = GrantResponse),
        (status = 400, description = "Empty or malformed request body", body = ErrorResponse),
        (status = 401, description = "Request denied", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub(crate) async fn auth_request_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match state.operation.request_handler().handle(&body).await {
        Ok(grant) => {
            let mut response = Json(grant).into_response();
            presets::no_store().apply(&mut response);
            response
        }
        Err(err) => err.into_response(),
    }
}
