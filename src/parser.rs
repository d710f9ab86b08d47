//! Turns raw webhook requests into typed payloads

use axum::http::HeaderMap;
use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::payload::{EventKind, UNMAPPED_EVENT_KEYS, UnmappedPayload, WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

pub const EVENT_KEY_HEADER: &str = "x-event-key";
pub const HOOK_UUID_HEADER: &str = "x-hook-uuid";
pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const REQUEST_UUID_HEADER: &str = "x-request-uuid";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("event {event_key} is not handled by this gateway")]
    EventNotFound { event_key: String },

    #[error("missing X-Event-Key header")]
    MissingEventKeyHeader,

    #[error("missing X-Hook-UUID header")]
    MissingHookUuidHeader,

    #[error("X-Hook-UUID does not match the configured hook UUID")]
    HookUuidMismatch,

    #[error("missing X-Hub-Signature header")]
    MissingSignatureHeader,

    #[error("X-Hub-Signature does not match the payload")]
    InvalidSignature,

    #[error("error parsing payload: {0}")]
    MalformedPayload(String),
}

impl ParseError {
    /// The request was well formed but names an event this gateway does not
    /// handle.
    pub fn is_event_not_found(&self) -> bool {
        matches!(self, ParseError::EventNotFound { .. })
    }

    /// The request failed an authenticity check.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            ParseError::MissingHookUuidHeader
                | ParseError::HookUuidMismatch
                | ParseError::MissingSignatureHeader
                | ParseError::InvalidSignature
        )
    }
}

/// Parses Bitbucket deliveries for a fixed set of event kinds.
#[derive(Debug, Clone)]
pub struct PayloadParser {
    accepted: Vec<EventKind>,
    accept_unmapped: bool,
    hook_uuid: Option<String>,
    secret: Option<String>,
}

impl Default for PayloadParser {
    fn default() -> Self {
        Self::new(EventKind::ALL)
    }
}

impl PayloadParser {
    pub fn new(accepted: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            accepted: accepted.into_iter().collect(),
            accept_unmapped: true,
            hook_uuid: None,
            secret: None,
        }
    }

    /// Whether keys from [`UNMAPPED_EVENT_KEYS`] parse as
    /// [`WebhookPayload::Unmapped`] instead of `EventNotFound`.
    pub fn with_unmapped(mut self, accept: bool) -> Self {
        self.accept_unmapped = accept;
        self
    }

    /// Requires deliveries to carry this value in `X-Hook-UUID`.
    pub fn with_hook_uuid(mut self, uuid: Option<String>) -> Self {
        self.hook_uuid = uuid.filter(|u| !u.is_empty());
        self
    }

    /// Requires deliveries to be signed with this secret.
    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn parse(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookPayload, ParseError> {
        if let Some(expected) = &self.hook_uuid {
            let uuid = header_str(headers, HOOK_UUID_HEADER)
                .ok_or(ParseError::MissingHookUuidHeader)?;
            if uuid != expected {
                return Err(ParseError::HookUuidMismatch);
            }
        }

        if let Some(secret) = &self.secret {
            let signature = header_str(headers, SIGNATURE_HEADER)
                .ok_or(ParseError::MissingSignatureHeader)?;
            if !verify_signature(secret, body, signature) {
                return Err(ParseError::InvalidSignature);
            }
        }

        let event_key =
            header_str(headers, EVENT_KEY_HEADER).ok_or(ParseError::MissingEventKeyHeader)?;

        let kind = EventKind::from_key(event_key).filter(|k| self.accepted.contains(k));
        let unmapped = self.accept_unmapped && UNMAPPED_EVENT_KEYS.iter().any(|k| *k == event_key);
        if kind.is_none() && !unmapped {
            return Err(ParseError::EventNotFound {
                event_key: event_key.to_string(),
            });
        }

        if body.is_empty() {
            return Err(ParseError::MalformedPayload("empty body".to_string()));
        }

        let parsed = match kind {
            Some(kind) => WebhookPayload::from_slice(kind, body),
            None => serde_json::from_slice(body).map(|body| {
                WebhookPayload::Unmapped(UnmappedPayload {
                    event_key: event_key.to_string(),
                    body,
                })
            }),
        };
        parsed.map_err(|e| ParseError::MalformedPayload(e.to_string()))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Checks a `sha256=<hex>` signature over the raw body.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    let Some(hex_signature) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex_decode(hex_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
