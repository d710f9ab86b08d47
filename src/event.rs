//! Canonical events handed to the event bus

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies this gateway as the source of every event it emits.
pub const EVENT_SOURCE: &str = "brigade.sh/bitbucket";

/// Git revision an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitDetails {
    pub commit: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

/// A translated webhook, ready to be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub qualifiers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitDetails>,
    /// The original delivery body, JSON encoded.
    pub payload: String,
}

/// Events the bus accepted for one `create` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventList {
    pub ids: Vec<String>,
}

impl EventList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Body returned to the webhook sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    #[serde(rename = "eventIDs")]
    pub event_ids: Vec<String>,
}

impl From<EventList> for WebhookResponse {
    fn from(events: EventList) -> Self {
        Self {
            event_ids: events.ids,
        }
    }
}
