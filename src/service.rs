//! Transport-agnostic handling of parsed deliveries

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::event::EventList;
use crate::payload::WebhookPayload;
use crate::policy::EmissionPolicy;
use crate::publisher::EventPublisher;
use crate::translate::{Translation, translate};

/// Translates, filters and publishes webhook deliveries.
pub struct WebhookService {
    publisher: Arc<dyn EventPublisher>,
    policy: EmissionPolicy,
}

impl WebhookService {
    pub fn new(publisher: Arc<dyn EventPublisher>, policy: EmissionPolicy) -> Self {
        Self { publisher, policy }
    }

    pub fn policy(&self) -> &EmissionPolicy {
        &self.policy
    }

    /// Returns the ids of the events created for `payload`. Deliveries that
    /// have no translation, or whose event the policy suppresses, produce an
    /// empty list without touching the publisher.
    pub async fn handle(&self, payload: &WebhookPayload) -> Result<EventList> {
        let event = match translate(payload)? {
            Translation::Event(event) => event,
            Translation::NoMapping => {
                debug!("No event mapping for {}; nothing to publish", payload.event_key());
                return Ok(EventList::empty());
            }
        };

        if !self.policy.should_emit(&event.event_type) {
            debug!("Event {} not in emitted events; skipping", event.event_type);
            return Ok(EventList::empty());
        }

        let events = self.publisher.create(&event).await?;
        info!(
            "Emitted {} event for {} ({} created)",
            event.event_type,
            event.qualifiers.get("repo").map(String::as_str).unwrap_or_default(),
            events.ids.len()
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::error::GatewayError;
    use crate::event::{GitDetails, OutboundEvent};
    use crate::payload::{EventKind, UnmappedPayload};
    use crate::publisher::PublishError;

    /// Records every event it is asked to create.
    #[derive(Default)]
    struct RecordingPublisher {
        created: Mutex<Vec<OutboundEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn create(&self, event: &OutboundEvent) -> std::result::Result<EventList, PublishError> {
            if self.fail {
                return Err(PublishError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let mut created = self.created.lock().unwrap();
            created.push(event.clone());
            Ok(EventList {
                ids: vec![format!("evt-{}", created.len())],
            })
        }
    }

    fn merged_pull_request() -> WebhookPayload {
        let body = json!({
            "repository": {"full_name": "org/repo"},
            "pullrequest": {
                "source": {"branch": {"name": "feature-x"}, "commit": {"hash": "deadbeef"}},
                "destination": {"branch": {"name": "main"}, "commit": {"hash": "cafebabe"}}
            }
        });
        WebhookPayload::from_slice(EventKind::PullRequestMerged, &serde_json::to_vec(&body).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn allowed_event_is_published_once() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = WebhookService::new(publisher.clone(), EmissionPolicy::new(["pullrequest"]));

        let events = service.handle(&merged_pull_request()).await.unwrap();

        assert_eq!(events.ids, vec!["evt-1"]);
        let created = publisher.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let event = &created[0];
        assert_eq!(event.event_type, "pullrequest:fulfilled");
        assert_eq!(event.qualifiers.len(), 1);
        assert_eq!(event.qualifiers["repo"], "org/repo");
        assert_eq!(
            event.git,
            Some(GitDetails {
                commit: "deadbeef".to_string(),
                git_ref: Some("feature-x".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn suppressed_event_is_not_published() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = WebhookService::new(publisher.clone(), EmissionPolicy::new(["issue"]));

        let events = service.handle(&merged_pull_request()).await.unwrap();

        assert!(events.is_empty());
        assert!(publisher.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_policy_publishes_nothing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = WebhookService::new(publisher.clone(), EmissionPolicy::default());

        assert!(service.handle(&merged_pull_request()).await.unwrap().is_empty());
        assert!(publisher.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmapped_payload_is_silently_dropped() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = WebhookService::new(publisher.clone(), EmissionPolicy::new(["*"]));
        let payload = WebhookPayload::Unmapped(UnmappedPayload {
            event_key: "repo:deleted".to_string(),
            body: json!({}),
        });

        assert!(service.handle(&payload).await.unwrap().is_empty());
        assert!(publisher.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_an_error() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let service = WebhookService::new(publisher, EmissionPolicy::new(["*"]));

        let err = service.handle(&merged_pull_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Publish(_)));
    }
}
