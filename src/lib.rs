//! Bitbucket webhook gateway: receives Bitbucket Cloud deliveries and
//! republishes them as normalized events on an event bus.

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod ip_filter;
pub mod logging;
pub mod parser;
pub mod payload;
pub mod policy;
pub mod publisher;
pub mod service;
pub mod translate;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use event::{EventList, GitDetails, OutboundEvent};
pub use ip_filter::IpFilter;
pub use parser::PayloadParser;
pub use payload::{EventKind, WebhookPayload};
pub use policy::EmissionPolicy;
pub use publisher::{EventPublisher, HttpEventPublisher};
pub use service::WebhookService;
pub use translate::{Translation, translate};

/// Everything a request needs. Built once at startup and never mutated.
pub struct AppState {
    pub parser: PayloadParser,
    pub service: WebhookService,
    pub ip_filter: Arc<IpFilter>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(parser: PayloadParser, service: WebhookService, ip_filter: IpFilter) -> Self {
        Self {
            parser,
            service,
            ip_filter: Arc::new(ip_filter),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Wires the gateway from configuration and an event publisher.
    pub fn from_config(config: &GatewayConfig, publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        let parser = PayloadParser::default()
            .with_hook_uuid(config.webhook.hook_uuid.clone())
            .with_secret(config.webhook.secret.clone());
        let service = WebhookService::new(publisher, config.webhook.emitted_events.clone());
        let ip_filter = IpFilter::new(config.server.allowed_client_ips.as_slice())?;
        Ok(Self::new(parser, service, ip_filter))
    }
}

pub type SharedState = Arc<AppState>;
