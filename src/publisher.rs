//! Event bus client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{EventList, OutboundEvent};

const EVENTS_PATH: &str = "/v2/events";
const API_VERSION: &str = "brigade.sh/v2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("request to event bus failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("event bus responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode event bus response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("could not build event bus client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Creates events on the bus. One call per event, no retries.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn create(&self, event: &OutboundEvent) -> Result<EventList, PublishError>;
}

/// Connection settings for [`HttpEventPublisher`].
#[derive(Debug, Clone)]
pub struct ApiClientOptions {
    pub address: String,
    pub token: String,
    pub allow_insecure_connections: bool,
    pub timeout: Duration,
}

impl ApiClientOptions {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            allow_insecure_connections: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_insecure_connections(mut self, allow: bool) -> Self {
        self.allow_insecure_connections = allow;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Publishes events to the bus's REST API.
pub struct HttpEventPublisher {
    client: reqwest::Client,
    events_url: String,
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventEnvelope<'a> {
    api_version: &'static str,
    kind: &'static str,
    #[serde(flatten)]
    event: &'a OutboundEvent,
}

#[derive(Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Deserialize)]
struct EventItem {
    metadata: EventMetadata,
}

#[derive(Deserialize)]
struct EventMetadata {
    id: String,
}

impl HttpEventPublisher {
    pub fn new(options: &ApiClientOptions) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(options.allow_insecure_connections)
            .timeout(options.timeout)
            .build()
            .map_err(PublishError::Client)?;
        Ok(Self {
            client,
            events_url: format!("{}{}", options.address.trim_end_matches('/'), EVENTS_PATH),
            token: options.token.clone(),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn create(&self, event: &OutboundEvent) -> Result<EventList, PublishError> {
        let envelope = EventEnvelope {
            api_version: API_VERSION,
            kind: "Event",
            event,
        };
        debug!("Creating {} event at {}", event.event_type, self.events_url);

        let response = self
            .client
            .post(&self.events_url)
            .bearer_auth(&self.token)
            .json(&envelope)
            .send()
            .await
            .map_err(PublishError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let list: EventListResponse = response.json().await.map_err(PublishError::Decode)?;
        Ok(EventList {
            ids: list.items.into_iter().map(|item| item.metadata.id).collect(),
        })
    }
}
