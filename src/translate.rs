//! Translation of Bitbucket deliveries into outbound events

use std::collections::BTreeMap;

use crate::error::Result;
use crate::event::{EVENT_SOURCE, GitDetails, OutboundEvent};
use crate::payload::{
    CommitCommentPayload, CommitStatusPayload, EventKind, PullRequestPayload, PushPayload,
    Repository, WebhookPayload,
};

/// Outcome of translating one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    Event(OutboundEvent),
    /// The delivery was recognized but there is nothing to publish for it.
    NoMapping,
}

/// Maps a parsed delivery onto the event it should produce.
///
/// The only failure is being unable to encode the original payload.
pub fn translate(payload: &WebhookPayload) -> Result<Translation> {
    let (kind, repository, git) = match payload {
        WebhookPayload::IssueCommentCreated(p) => (EventKind::IssueCommentCreated, &p.repository, None),
        WebhookPayload::IssueCreated(p) => (EventKind::IssueCreated, &p.repository, None),
        WebhookPayload::IssueUpdated(p) => (EventKind::IssueUpdated, &p.repository, None),
        WebhookPayload::PullRequestApproved(p) => pull_request(EventKind::PullRequestApproved, p),
        WebhookPayload::PullRequestCommentCreated(p) => {
            pull_request(EventKind::PullRequestCommentCreated, p)
        }
        WebhookPayload::PullRequestCommentDeleted(p) => {
            pull_request(EventKind::PullRequestCommentDeleted, p)
        }
        WebhookPayload::PullRequestCommentUpdated(p) => {
            pull_request(EventKind::PullRequestCommentUpdated, p)
        }
        WebhookPayload::PullRequestCreated(p) => pull_request(EventKind::PullRequestCreated, p),
        WebhookPayload::PullRequestDeclined(p) => pull_request(EventKind::PullRequestDeclined, p),
        WebhookPayload::PullRequestMerged(p) => pull_request(EventKind::PullRequestMerged, p),
        WebhookPayload::PullRequestUnapproved(p) => pull_request(EventKind::PullRequestUnapproved, p),
        WebhookPayload::PullRequestUpdated(p) => pull_request(EventKind::PullRequestUpdated, p),
        WebhookPayload::RepoCommitCommentCreated(p) => commit_comment(p),
        WebhookPayload::RepoCommitStatusCreated(p) => {
            commit_status(EventKind::RepoCommitStatusCreated, p)
        }
        WebhookPayload::RepoCommitStatusUpdated(p) => {
            commit_status(EventKind::RepoCommitStatusUpdated, p)
        }
        WebhookPayload::RepoFork(p) => (EventKind::RepoFork, &p.repository, None),
        WebhookPayload::RepoPush(p) => push(p),
        WebhookPayload::RepoUpdated(p) => (EventKind::RepoUpdated, &p.repository, None),
        WebhookPayload::Unmapped(_) => return Ok(Translation::NoMapping),
    };

    let mut qualifiers = BTreeMap::new();
    qualifiers.insert("repo".to_string(), repository.full_name.clone());

    Ok(Translation::Event(OutboundEvent {
        source: EVENT_SOURCE.to_string(),
        event_type: kind.as_str().to_string(),
        qualifiers,
        git,
        payload: serde_json::to_string(payload)?,
    }))
}

type Mapped<'a> = (EventKind, &'a Repository, Option<GitDetails>);

/// Pull requests point at their source side: that is what a build checks out.
fn pull_request(kind: EventKind, p: &PullRequestPayload) -> Mapped<'_> {
    let source = &p.pullrequest.source;
    let git = GitDetails {
        commit: source.commit.hash.clone(),
        git_ref: Some(source.branch.name.clone()),
    };
    (kind, &p.repository, Some(git))
}

/// Only the first change of a push is described.
fn push(p: &PushPayload) -> Mapped<'_> {
    let git = p
        .push
        .changes
        .first()
        .and_then(|change| change.new.as_ref())
        .map(|new| GitDetails {
            commit: new.target.hash.clone(),
            git_ref: Some(new.name.clone()),
        });
    (EventKind::RepoPush, &p.repository, git)
}

fn commit_comment(p: &CommitCommentPayload) -> Mapped<'_> {
    let git = GitDetails {
        commit: p.commit.hash.clone(),
        git_ref: None,
    };
    (EventKind::RepoCommitCommentCreated, &p.repository, Some(git))
}

fn commit_status(kind: EventKind, p: &CommitStatusPayload) -> Mapped<'_> {
    let git = GitDetails {
        commit: commit_from_link(&p.commit_status.links.commit.href).to_string(),
        git_ref: None,
    };
    (kind, &p.repository, Some(git))
}

/// The last `/`-separated segment of a commit link. A link without any `/`
/// is returned whole.
pub fn commit_from_link(href: &str) -> &str {
    href.rsplit('/').next().unwrap_or(href)
}
