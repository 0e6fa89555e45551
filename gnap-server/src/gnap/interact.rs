use crate::errors::{ErrorResponse, GnapError};
use crate::gnap::parse_body;
use crate::grant::credential::{generate_nonce, GrantId};
use crate::grant::{pending_key, InteractionState, PendingGrant};
use crate::interaction::{InteractionHandler, TXN_ID_PARAM};
use crate::models::{InteractionCompleteRequest, InteractionCompleteResponse};
use crate::openapi::GNAP_TAG;
use crate::state::AppState;
use crate::store::{ReplaceOutcome, Store, StoreBackend};
use axum::body::Bytes;
use axum::extract::{Json, RawQuery, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use http::header::LOCATION;
use http::StatusCode;
use log::info;
use std::sync::Arc;
use url::Url;

/// Records the resource owner's decision on a pending grant
pub struct InteractionCompletion {
    store: Store,
    interaction: Arc<dyn InteractionHandler>,
    grant_uri: String,
}

impl InteractionCompletion {
    pub fn new(store: Store, interaction: Arc<dyn InteractionHandler>, grant_uri: String) -> Self {
        Self {
            store,
            interaction,
            grant_uri,
        }
    }

    /// Approves or cancels the pending grant identified by `txn_id`.
    ///
    /// Approval marks the grant completed under a fresh interaction reference
    /// and returns the client finish redirect when the client asked for one.
    /// The record is only rewritten while it still exists, so a grant that was
    /// finalized in the meantime is never brought back.
    pub async fn complete(&self, txn_id: &str, approved: bool) -> Result<Option<Url>, GnapError> {
        let grant_id =
            GrantId::parse(txn_id).ok_or_else(|| GnapError::denied("malformed transaction id"))?;
        let key = pending_key(&grant_id);

        let mut pending: PendingGrant = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| GnapError::denied(format!("no pending grant {grant_id}")))?;

        if pending.is_expired(Utc::now()) {
            self.store.delete(&key).await?;
            return Err(GnapError::denied(format!("pending grant {grant_id} expired")));
        }
        if pending.state == InteractionState::Completed {
            return Err(GnapError::denied(format!(
                "interaction for {grant_id} already completed"
            )));
        }

        if !approved {
            self.store.delete(&key).await?;
            info!("Resource owner cancelled grant {grant_id}");
            return Ok(None);
        }

        let interact_ref = generate_nonce();
        let redirect = pending
            .finish
            .as_ref()
            .map(|finish| {
                self.interaction.finish_redirect(
                    finish,
                    &pending.server_nonce,
                    &interact_ref,
                    &self.grant_uri,
                )
            })
            .transpose()
            .map_err(GnapError::internal)?;

        pending.state = InteractionState::Completed;
        pending.interact_ref = Some(interact_ref);
        match self.store.replace(&key, &pending).await? {
            ReplaceOutcome::Replaced => {
                info!("Resource owner approved grant {grant_id}");
                Ok(redirect)
            }
            ReplaceOutcome::Missing => Err(GnapError::denied(format!(
                "pending grant {grant_id} disappeared during completion"
            ))),
        }
    }
}

fn txn_id(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == TXN_ID_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Send the resource owner to the interaction front-end
#[utoipa::path(
    get,
    path = "/gnap/interact",
    tag = GNAP_TAG,
    params(
        ("txnID" = Option<String>, Query, description = "Pending grant identifier"),
    ),
    responses(
        (status = 302, description = "Redirect to the interaction front-end")
    )
)]
pub(crate) async fn interact_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let txn_id = txn_id(query.as_deref());
    let target = state
        .operation
        .interaction_handler()
        .interaction_target(txn_id.as_deref());

    (StatusCode::FOUND, [(LOCATION, target.to_string())]).into_response()
}

/// Report the resource owner's decision
#[utoipa::path(
    post,
    path = "/gnap/interact/complete",
    tag = GNAP_TAG,
    request_body = InteractionCompleteRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer callback secret"),
    ),
    responses(
        (status = 200, description = "Decision recorded", body = InteractionCompleteResponse),
        (status = 400, description = "Empty or malformed request body", body = ErrorResponse),
        (status = 401, description = "Unknown, expired or already completed grant", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub(crate) async fn interaction_complete_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let request: InteractionCompleteRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    match state
        .operation
        .complete_interaction(&request.txn_id, request.approved)
        .await
    {
        Ok(redirect) => Json(InteractionCompleteResponse {
            redirect: redirect.map(|url| url.to_string()),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnap::{Operation, INTERACT_COMPLETE_PATH, INTERACT_PATH};
    use crate::interaction::interaction_hash;
    use crate::policy::tests::test_policy_config;
    use crate::policy::RulePolicy;
    use crate::test_utils::{test_gnap_config, TestFixture};
    use serde_json::json;

    async fn operation() -> Operation {
        let policy = RulePolicy::new(&test_policy_config()).unwrap();
        Operation::new(test_gnap_config(policy)).await.unwrap()
    }

    /// Starts an interaction and returns the pending grant identifier
    async fn start_grant(operation: &Operation, with_finish: bool) -> GrantId {
        let mut interact = json!({"start": ["redirect"]});
        if with_finish {
            interact["finish"] = json!({
                "method": "redirect",
                "uri": "https://client.example.net/cb",
                "nonce": "client-nonce"
            });
        }
        let body = serde_json::to_vec(&json!({
            "access_token": {"access": [{"type": "bank-account"}]},
            "interact": interact
        }))
        .unwrap();

        let response = operation.request_handler().handle(&body).await.unwrap();
        let redirect = Url::parse(&response.interact.unwrap().redirect).unwrap();
        GrantId::parse(&txn_id(redirect.query()).unwrap()).unwrap()
    }

    async fn pending(operation: &Operation, grant_id: &GrantId) -> Option<PendingGrant> {
        operation.store.get(&pending_key(grant_id)).await.unwrap()
    }

    #[test]
    fn test_txn_id_extraction() {
        assert_eq!(txn_id(Some("txnID=abc&x=1")).as_deref(), Some("abc"));
        assert_eq!(txn_id(Some("x=1")), None);
        assert_eq!(txn_id(Some("%%%")), None);
        assert_eq!(txn_id(None), None);
    }

    #[tokio::test]
    async fn test_approval_completes_grant_and_builds_finish_redirect() {
        let operation = operation().await;
        let grant_id = start_grant(&operation, true).await;

        let redirect = operation
            .complete_interaction(grant_id.as_str(), true)
            .await
            .unwrap()
            .expect("finish redirect");

        let stored = pending(&operation, &grant_id).await.unwrap();
        assert_eq!(stored.state, InteractionState::Completed);
        let interact_ref = stored.interact_ref.unwrap();

        assert_eq!(redirect.host_str(), Some("client.example.net"));
        let pairs: Vec<(String, String)> = redirect
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("interact_ref".to_string(), interact_ref.clone())));
        let expected_hash = interaction_hash(
            "client-nonce",
            &stored.server_nonce,
            &interact_ref,
            "https://as.example.com/gnap/auth",
        );
        assert!(pairs.contains(&("hash".to_string(), expected_hash)));
    }

    #[tokio::test]
    async fn test_approval_without_finish_returns_no_redirect() {
        let operation = operation().await;
        let grant_id = start_grant(&operation, false).await;

        let redirect = operation
            .complete_interaction(grant_id.as_str(), true)
            .await
            .unwrap();
        assert!(redirect.is_none());
        assert_eq!(
            pending(&operation, &grant_id).await.unwrap().state,
            InteractionState::Completed
        );
    }

    #[tokio::test]
    async fn test_second_completion_is_denied() {
        let operation = operation().await;
        let grant_id = start_grant(&operation, false).await;

        operation
            .complete_interaction(grant_id.as_str(), true)
            .await
            .unwrap();
        let result = operation.complete_interaction(grant_id.as_str(), true).await;
        assert!(matches!(result, Err(GnapError::RequestDenied(_))));
    }

    #[tokio::test]
    async fn test_cancel_removes_grant() {
        let operation = operation().await;
        let grant_id = start_grant(&operation, true).await;

        let redirect = operation
            .complete_interaction(grant_id.as_str(), false)
            .await
            .unwrap();
        assert!(redirect.is_none());
        assert!(pending(&operation, &grant_id).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_transaction_is_denied() {
        let operation = operation().await;

        let result = operation.complete_interaction("not-an-id", true).await;
        assert!(matches!(result, Err(GnapError::RequestDenied(_))));

        let unknown = GrantId::generate();
        let result = operation.complete_interaction(unknown.as_str(), true).await;
        assert!(matches!(result, Err(GnapError::RequestDenied(_))));
    }

    #[tokio::test]
    async fn test_expired_grant_is_denied_and_removed() {
        let operation = operation().await;
        let grant_id = start_grant(&operation, false).await;

        let mut stored = pending(&operation, &grant_id).await.unwrap();
        stored.expires_at = Utc::now() - chrono::Duration::seconds(1);
        operation
            .store
            .set(&pending_key(&grant_id), &stored, None)
            .await
            .unwrap();

        let result = operation.complete_interaction(grant_id.as_str(), true).await;
        assert!(matches!(result, Err(GnapError::RequestDenied(_))));
        assert!(pending(&operation, &grant_id).await.is_none());
    }

    #[tokio::test]
    async fn test_interact_endpoint_always_redirects() {
        let fixture = TestFixture::new().await;

        let response = fixture.get(format!("{INTERACT_PATH}?txnID=abc")).await;
        response.assert_status(StatusCode::FOUND);
        assert_eq!(
            response.header("location").as_deref(),
            Some("https://as.example.com/ui/consent?txnID=abc")
        );

        let response = fixture.get(INTERACT_PATH).await;
        response.assert_status(StatusCode::FOUND);
        assert_eq!(
            response.header("location").as_deref(),
            Some("https://as.example.com/ui/consent")
        );
    }

    #[tokio::test]
    async fn test_complete_endpoint_requires_callback_secret() {
        let fixture = TestFixture::new().await;
        let body = json!({"txnID": GrantId::generate().as_str(), "approved": true}).to_string();

        fixture
            .post_raw(INTERACT_COMPLETE_PATH, &body, &[])
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        fixture
            .post_raw(
                INTERACT_COMPLETE_PATH,
                &body,
                &[("Authorization", "Bearer wrong-secret")],
            )
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // Authenticated, but the grant does not exist
        let response = fixture
            .post_raw(INTERACT_COMPLETE_PATH, &body, &fixture.callback_auth())
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json, json!({"error": "request_denied"}));

        fixture
            .post_raw(INTERACT_COMPLETE_PATH, "", &fixture.callback_auth())
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
