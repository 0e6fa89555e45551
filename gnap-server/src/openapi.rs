use crate::api::health;
use crate::gnap::{continuation, interact, introspection, request};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const GNAP_TAG: &str = "GNAP API";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::ready_check,
        request::auth_request_handler,
        interact::interact_handler,
        interact::interaction_complete_handler,
        continuation::auth_continue_handler,
        introspection::introspect_handler,
    ),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = GNAP_TAG, description = "Grant negotiation endpoints"),
    ),
    info(
        title = "GNAP Authorization Server API",
        description = "Grant request, interaction, continuation and token introspection",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
