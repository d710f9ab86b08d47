//! HTTP surface: the webhook endpoint and a health check

pub mod health;
pub mod webhook;

use axum::{Router, middleware, routing};

use crate::SharedState;
use crate::ip_filter::filter_client_ip;

pub use health::healthz;
pub use webhook::handle_webhook;

pub const EVENTS_PATH: &str = "/events";
pub const HEALTH_PATH: &str = "/healthz";

/// Builds the gateway router. The IP allow-list only guards the webhook
/// endpoint.
pub fn create_router(state: SharedState) -> Router {
    let events = Router::new()
        .route(EVENTS_PATH, routing::post(handle_webhook))
        .route_layer(middleware::from_fn_with_state(
            state.ip_filter.clone(),
            filter_client_ip,
        ));

    Router::new()
        .merge(events)
        .route(HEALTH_PATH, routing::get(healthz))
        .with_state(state)
}
