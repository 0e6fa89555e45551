use crate::errors::GnapError;
use crate::grant::credential::constant_time_eq;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Guards the interaction front-end callback with the shared callback secret.
///
/// An unset secret rejects every call.
pub(super) async fn callback_authentication_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let secret = &state.settings.interaction.callback_secret;
    if secret.is_empty() {
        return GnapError::denied("interaction callback secret is not configured").into_response();
    }

    let presented = match request.headers().get(http::header::AUTHORIZATION) {
        Some(header) => match header.to_str() {
            Ok(value) => value.strip_prefix("Bearer ").unwrap_or_default().to_string(),
            Err(e) => {
                return GnapError::denied(format!(
                    "Failed to parse Authorization header to string: {e}"
                ))
                .into_response()
            }
        },
        None => return GnapError::denied("Missing Authorization header").into_response(),
    };

    if presented.is_empty() || !constant_time_eq(&presented, secret) {
        return GnapError::denied("Invalid interaction callback secret").into_response();
    }
    next.run(request).await
}
