//! Webhook handler for Bitbucket deliveries

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::event::WebhookResponse;
use crate::parser::{EVENT_KEY_HEADER, REQUEST_UUID_HEADER};

/// Handles the Bitbucket webhook POST request.
///
/// Unknown event keys answer 501 so Bitbucket shows the hook as
/// unsupported; every other failure is an opaque 500 with the detail only in
/// the log.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery_id = headers
        .get(REQUEST_UUID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let event_key = headers
        .get(EVENT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<none>")
        .to_string();
    let span = info_span!("webhook", delivery = %delivery_id, event = %event_key);

    async move {
        let payload = match state.parser.parse(&headers, &body) {
            Ok(payload) => payload,
            Err(e) if e.is_event_not_found() => {
                debug!("{}", e);
                return empty_response(StatusCode::NOT_IMPLEMENTED);
            }
            Err(e) if e.is_rejected() => {
                warn!("Rejected delivery: {}", e);
                return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
            Err(e) => {
                error!("Could not parse delivery: {}", e);
                return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        match state.service.handle(&payload).await {
            Ok(events) => (StatusCode::OK, Json(WebhookResponse::from(events))).into_response(),
            Err(e) => {
                error!("Failed to handle {} delivery: {}", event_key, e);
                empty_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
    .instrument(span)
    .await
}

fn empty_response(status: StatusCode) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], "{}").into_response()
}
