use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use utoipa::ToSchema;

/// Liveness or readiness report.
///
/// Serialized flat: `details` entries sit next to `status` in the body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    details: Option<Value>,
    #[serde(skip)]
    status_code: StatusCode,
}

impl Health {
    fn ok(details: Option<Value>) -> Self {
        Self {
            status: "ok".to_string(),
            details,
            status_code: StatusCode::OK,
        }
    }

    fn unavailable(reason: &str) -> Self {
        Self {
            status: "error".to_string(),
            details: Some(json!({ "error": reason })),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("status".to_string(), Value::String(self.status));
        if let Some(Value::Object(details)) = self.details {
            body.extend(details);
        }

        (self.status_code, Json(Value::Object(body))).into_response()
    }
}

/// Liveness: the process is up and serving requests
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is alive", body = Health)
    )
)]
pub(crate) async fn health_check() -> impl IntoResponse {
    Health::ok(None)
}

/// Readiness: the grant store answers within its timeout
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Grant store reachable", body = Health),
        (status = 503, description = "Grant store unreachable", body = Health)
    )
)]
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.health_check().await {
        Health::ok(Some(json!({ "store_status": "healthy" })))
    } else {
        Health::unavailable("Grant store is not healthy")
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}
