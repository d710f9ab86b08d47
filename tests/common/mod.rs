//! Shared helpers for HTTP-level tests

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use bitbucket_gateway::event::{EventList, OutboundEvent};
use bitbucket_gateway::publisher::{EventPublisher, PublishError};
use bitbucket_gateway::{
    AppState, EmissionPolicy, IpFilter, PayloadParser, WebhookService, api::create_router,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Publisher double that records events instead of sending them.
#[derive(Default)]
pub struct RecordingPublisher {
    pub created: Mutex<Vec<OutboundEvent>>,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn create(&self, event: &OutboundEvent) -> Result<EventList, PublishError> {
        if self.fail {
            return Err(PublishError::Status {
                status: 500,
                body: "bus down".to_string(),
            });
        }
        let mut created = self.created.lock().unwrap();
        created.push(event.clone());
        Ok(EventList {
            ids: vec![format!("event-{}", created.len())],
        })
    }
}

pub fn create_test_app(
    publisher: Arc<RecordingPublisher>,
    patterns: &[&str],
    allowed_ips: &[&str],
) -> Router {
    create_test_app_with_parser(publisher, PayloadParser::default(), patterns, allowed_ips)
}

pub fn create_test_app_with_parser(
    publisher: Arc<RecordingPublisher>,
    parser: PayloadParser,
    patterns: &[&str],
    allowed_ips: &[&str],
) -> Router {
    let service = WebhookService::new(publisher, EmissionPolicy::new(patterns.iter().copied()));
    let state = AppState::new(parser, service, IpFilter::new(allowed_ips).unwrap());
    create_router(Arc::new(state))
}

pub fn delivery(event_key: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .header("x-event-key", event_key)
        .header("x-request-uuid", "4d3e6d53-0a1c-4b6f-9d77-6a2c1a5b0f11")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// `sha256=<hex>` HMAC of `body`, as Bitbucket sends in `X-Hub-Signature`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn merged_pull_request() -> serde_json::Value {
    serde_json::json!({
        "actor": {"display_name": "Jane Doe"},
        "repository": {"full_name": "org/repo", "name": "repo"},
        "pullrequest": {
            "id": 42,
            "state": "MERGED",
            "source": {
                "branch": {"name": "feature-x"},
                "commit": {"hash": "deadbeef"}
            },
            "destination": {
                "branch": {"name": "main"},
                "commit": {"hash": "cafebabe"}
            }
        }
    })
}
