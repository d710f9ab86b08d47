//! Bitbucket Cloud webhook payload models
//!
//! Only the fields the gateway reads are typed. The decoded body travels
//! next to the typed view so the delivery can be handed downstream exactly
//! as Bitbucket sent it.

use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Every `X-Event-Key` the gateway translates into an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    IssueCommentCreated,
    IssueCreated,
    IssueUpdated,
    PullRequestApproved,
    PullRequestCommentCreated,
    PullRequestCommentDeleted,
    PullRequestCommentUpdated,
    PullRequestCreated,
    PullRequestDeclined,
    PullRequestMerged,
    PullRequestUnapproved,
    PullRequestUpdated,
    RepoCommitCommentCreated,
    RepoCommitStatusCreated,
    RepoCommitStatusUpdated,
    RepoFork,
    RepoPush,
    RepoUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 18] = [
        EventKind::IssueCommentCreated,
        EventKind::IssueCreated,
        EventKind::IssueUpdated,
        EventKind::PullRequestApproved,
        EventKind::PullRequestCommentCreated,
        EventKind::PullRequestCommentDeleted,
        EventKind::PullRequestCommentUpdated,
        EventKind::PullRequestCreated,
        EventKind::PullRequestDeclined,
        EventKind::PullRequestMerged,
        EventKind::PullRequestUnapproved,
        EventKind::PullRequestUpdated,
        EventKind::RepoCommitCommentCreated,
        EventKind::RepoCommitStatusCreated,
        EventKind::RepoCommitStatusUpdated,
        EventKind::RepoFork,
        EventKind::RepoPush,
        EventKind::RepoUpdated,
    ];

    /// The event-kind identifier. Bitbucket sends the same string in the
    /// `X-Event-Key` header, so declined and merged pull requests surface as
    /// `pullrequest:rejected` and `pullrequest:fulfilled`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IssueCommentCreated => "issue:comment_created",
            EventKind::IssueCreated => "issue:created",
            EventKind::IssueUpdated => "issue:updated",
            EventKind::PullRequestApproved => "pullrequest:approved",
            EventKind::PullRequestCommentCreated => "pullrequest:comment_created",
            EventKind::PullRequestCommentDeleted => "pullrequest:comment_deleted",
            EventKind::PullRequestCommentUpdated => "pullrequest:comment_updated",
            EventKind::PullRequestCreated => "pullrequest:created",
            EventKind::PullRequestDeclined => "pullrequest:rejected",
            EventKind::PullRequestMerged => "pullrequest:fulfilled",
            EventKind::PullRequestUnapproved => "pullrequest:unapproved",
            EventKind::PullRequestUpdated => "pullrequest:updated",
            EventKind::RepoCommitCommentCreated => "repo:commit_comment_created",
            EventKind::RepoCommitStatusCreated => "repo:commit_status_created",
            EventKind::RepoCommitStatusUpdated => "repo:commit_status_updated",
            EventKind::RepoFork => "repo:fork",
            EventKind::RepoPush => "repo:push",
            EventKind::RepoUpdated => "repo:updated",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == key)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event keys Bitbucket documents that the gateway accepts but never
/// translates.
pub const UNMAPPED_EVENT_KEYS: &[&str] = &[
    "repo:created",
    "repo:deleted",
    "repo:imported",
    "repo:transfer",
    "pullrequest:changes_request_created",
    "pullrequest:changes_request_removed",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Commit {
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Branch {
    pub name: String,
}

/// One side (source or destination) of a pull request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PullRequestEndpoint {
    pub branch: Branch,
    pub commit: Commit,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PullRequest {
    pub source: PullRequestEndpoint,
}

/// Shared shape of every `pullrequest:*` delivery.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PullRequestPayload {
    pub pullrequest: PullRequest,
    pub repository: Repository,
}

/// Shared shape of `issue:*`, `repo:fork` and `repo:updated` deliveries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepositoryPayload {
    pub repository: Repository,
}

/// The state of a ref after (or before) a push.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefState {
    pub name: String,
    pub target: Commit,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushChange {
    /// `null` when the push deleted the ref.
    #[serde(default)]
    pub new: Option<RefState>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Push {
    #[serde(default)]
    pub changes: Vec<PushChange>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushPayload {
    pub push: Push,
    pub repository: Repository,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommitCommentPayload {
    pub commit: Commit,
    pub repository: Repository,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommitStatusLinks {
    pub commit: Link,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommitStatus {
    pub links: CommitStatusLinks,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommitStatusPayload {
    pub commit_status: CommitStatus,
    pub repository: Repository,
}

/// A typed view of a delivery together with the body it was decoded from.
/// Serializing yields the body untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<T> {
    pub data: T,
    pub body: Value,
}

impl<T: DeserializeOwned> Delivery<T> {
    pub fn decode(body: Value) -> serde_json::Result<Self> {
        let data = T::deserialize(&body)?;
        Ok(Self { data, body })
    }
}

impl<T> Deref for Delivery<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> Serialize for Delivery<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// A delivery for an accepted event key that has no translation.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmappedPayload {
    pub event_key: String,
    pub body: Value,
}

impl Serialize for UnmappedPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// A parsed webhook delivery. Serializing a value yields the delivery body,
/// not a tagged envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    IssueCommentCreated(Delivery<RepositoryPayload>),
    IssueCreated(Delivery<RepositoryPayload>),
    IssueUpdated(Delivery<RepositoryPayload>),
    PullRequestApproved(Delivery<PullRequestPayload>),
    PullRequestCommentCreated(Delivery<PullRequestPayload>),
    PullRequestCommentDeleted(Delivery<PullRequestPayload>),
    PullRequestCommentUpdated(Delivery<PullRequestPayload>),
    PullRequestCreated(Delivery<PullRequestPayload>),
    PullRequestDeclined(Delivery<PullRequestPayload>),
    PullRequestMerged(Delivery<PullRequestPayload>),
    PullRequestUnapproved(Delivery<PullRequestPayload>),
    PullRequestUpdated(Delivery<PullRequestPayload>),
    RepoCommitCommentCreated(Delivery<CommitCommentPayload>),
    RepoCommitStatusCreated(Delivery<CommitStatusPayload>),
    RepoCommitStatusUpdated(Delivery<CommitStatusPayload>),
    RepoFork(Delivery<RepositoryPayload>),
    RepoPush(Delivery<PushPayload>),
    RepoUpdated(Delivery<RepositoryPayload>),
    Unmapped(UnmappedPayload),
}

impl WebhookPayload {
    /// Decodes a delivery body into the variant for `kind`.
    pub fn from_slice(kind: EventKind, body: &[u8]) -> serde_json::Result<Self> {
        let body: Value = serde_json::from_slice(body)?;
        let payload = match kind {
            EventKind::IssueCommentCreated => Self::IssueCommentCreated(Delivery::decode(body)?),
            EventKind::IssueCreated => Self::IssueCreated(Delivery::decode(body)?),
            EventKind::IssueUpdated => Self::IssueUpdated(Delivery::decode(body)?),
            EventKind::PullRequestApproved => Self::PullRequestApproved(Delivery::decode(body)?),
            EventKind::PullRequestCommentCreated => {
                Self::PullRequestCommentCreated(Delivery::decode(body)?)
            }
            EventKind::PullRequestCommentDeleted => {
                Self::PullRequestCommentDeleted(Delivery::decode(body)?)
            }
            EventKind::PullRequestCommentUpdated => {
                Self::PullRequestCommentUpdated(Delivery::decode(body)?)
            }
            EventKind::PullRequestCreated => Self::PullRequestCreated(Delivery::decode(body)?),
            EventKind::PullRequestDeclined => Self::PullRequestDeclined(Delivery::decode(body)?),
            EventKind::PullRequestMerged => Self::PullRequestMerged(Delivery::decode(body)?),
            EventKind::PullRequestUnapproved => {
                Self::PullRequestUnapproved(Delivery::decode(body)?)
            }
            EventKind::PullRequestUpdated => Self::PullRequestUpdated(Delivery::decode(body)?),
            EventKind::RepoCommitCommentCreated => {
                Self::RepoCommitCommentCreated(Delivery::decode(body)?)
            }
            EventKind::RepoCommitStatusCreated => {
                Self::RepoCommitStatusCreated(Delivery::decode(body)?)
            }
            EventKind::RepoCommitStatusUpdated => {
                Self::RepoCommitStatusUpdated(Delivery::decode(body)?)
            }
            EventKind::RepoFork => Self::RepoFork(Delivery::decode(body)?),
            EventKind::RepoPush => Self::RepoPush(Delivery::decode(body)?),
            EventKind::RepoUpdated => Self::RepoUpdated(Delivery::decode(body)?),
        };
        Ok(payload)
    }

    /// The `X-Event-Key` this payload was delivered under.
    pub fn event_key(&self) -> &str {
        match self {
            WebhookPayload::Unmapped(p) => &p.event_key,
            other => other.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }

    /// `None` for unmapped deliveries.
    pub fn kind(&self) -> Option<EventKind> {
        let kind = match self {
            WebhookPayload::IssueCommentCreated(_) => EventKind::IssueCommentCreated,
            WebhookPayload::IssueCreated(_) => EventKind::IssueCreated,
            WebhookPayload::IssueUpdated(_) => EventKind::IssueUpdated,
            WebhookPayload::PullRequestApproved(_) => EventKind::PullRequestApproved,
            WebhookPayload::PullRequestCommentCreated(_) => EventKind::PullRequestCommentCreated,
            WebhookPayload::PullRequestCommentDeleted(_) => EventKind::PullRequestCommentDeleted,
            WebhookPayload::PullRequestCommentUpdated(_) => EventKind::PullRequestCommentUpdated,
            WebhookPayload::PullRequestCreated(_) => EventKind::PullRequestCreated,
            WebhookPayload::PullRequestDeclined(_) => EventKind::PullRequestDeclined,
            WebhookPayload::PullRequestMerged(_) => EventKind::PullRequestMerged,
            WebhookPayload::PullRequestUnapproved(_) => EventKind::PullRequestUnapproved,
            WebhookPayload::PullRequestUpdated(_) => EventKind::PullRequestUpdated,
            WebhookPayload::RepoCommitCommentCreated(_) => EventKind::RepoCommitCommentCreated,
            WebhookPayload::RepoCommitStatusCreated(_) => EventKind::RepoCommitStatusCreated,
            WebhookPayload::RepoCommitStatusUpdated(_) => EventKind::RepoCommitStatusUpdated,
            WebhookPayload::RepoFork(_) => EventKind::RepoFork,
            WebhookPayload::RepoPush(_) => EventKind::RepoPush,
            WebhookPayload::RepoUpdated(_) => EventKind::RepoUpdated,
            WebhookPayload::Unmapped(_) => return None,
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_keys_round_trip_through_from_key() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_key(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_key("pullrequest:merged"), None);
        assert_eq!(EventKind::from_key("repo:created"), None);
    }

    #[test]
    fn unmodelled_fields_survive_serialization() {
        let body = json!({
            "actor": {"display_name": "Jane"},
            "repository": {
                "full_name": "org/repo",
                "links": {"html": {"href": "https://bitbucket.org/org/repo"}}
            },
            "fork": {"full_name": "jane/repo"}
        });
        let bytes = serde_json::to_vec(&body).unwrap();
        let payload = WebhookPayload::from_slice(EventKind::RepoFork, &bytes).unwrap();

        let reencoded = serde_json::to_value(&payload).unwrap();
        assert_eq!(reencoded, body);
    }

    #[test]
    fn push_change_without_new_state_decodes() {
        let body = json!({
            "repository": {"full_name": "org/repo"},
            "push": {"changes": [{"new": null, "old": {"name": "gone"}}]}
        });
        let bytes = serde_json::to_vec(&body).unwrap();
        let payload = WebhookPayload::from_slice(EventKind::RepoPush, &bytes).unwrap();

        match payload {
            WebhookPayload::RepoPush(push) => assert!(push.push.changes[0].new.is_none()),
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn absent_optional_keys_stay_absent() {
        let bodies = [
            json!({
                "repository": {"full_name": "org/repo"},
                "push": {"changes": [{"old": {"name": "gone", "target": {"hash": "0000"}}}]}
            }),
            json!({"repository": {"full_name": "org/repo"}, "push": {}}),
        ];
        for body in bodies {
            let bytes = serde_json::to_vec(&body).unwrap();
            let payload = WebhookPayload::from_slice(EventKind::RepoPush, &bytes).unwrap();
            assert_eq!(serde_json::to_value(&payload).unwrap(), body);
        }
    }

    #[test]
    fn missing_repository_is_rejected() {
        let bytes = br#"{"pullrequest": {}}"#;
        assert!(WebhookPayload::from_slice(EventKind::PullRequestCreated, bytes).is_err());
    }

    #[test]
    fn unmapped_payload_reports_its_key() {
        let payload = WebhookPayload::Unmapped(UnmappedPayload {
            event_key: "repo:created".to_string(),
            body: json!({"repository": {"full_name": "org/repo"}}),
        });
        assert_eq!(payload.event_key(), "repo:created");
        assert_eq!(payload.kind(), None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"repository": {"full_name": "org/repo"}})
        );
    }
}
