mod authn_middleware;
pub(crate) mod health;

use crate::api::authn_middleware::callback_authentication_middleware;
use crate::gnap::{interact, Operation, INTERACT_COMPLETE_PATH};
use crate::state::AppState;
use axum::{middleware, routing::post, Router};

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(Operation::router())
        .merge(callback_routes(state))
}

/// Routes called by the interaction front-end, guarded by the callback secret
fn callback_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            INTERACT_COMPLETE_PATH,
            post(interact::interaction_complete_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            callback_authentication_middleware,
        ))
}
