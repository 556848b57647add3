use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

/// Verdict of a single submitted review, as GitHub reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Unknown,
}

/// Current standing of one reviewer on one pull request.
///
/// Created the first time a login is requested or submits a review, replaced
/// on every poll cycle, never independently deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewerStatus {
    pub state: Option<ReviewVerdict>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// The recorded review predates the latest commit on the pull request.
    pub stale: bool,
    pub avatar_url: Option<String>,
}

/// Canonical aggregate for one watched pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPullRequest {
    /// `"{repo_full_name}/{number}"`, stable identity in the watched set.
    pub key: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub author: String,
    pub author_avatar: Option<String>,
    pub html_url: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewers: BTreeMap<String, ReviewerStatus>,
    /// Every reviewer has a current, non-stale approval.
    pub ready: bool,
    /// Base branch differs from the repository's expected default branch.
    pub branch_mismatch: bool,
    pub ticket_url: Option<String>,
}

pub fn pull_request_key(repo_full_name: &str, number: u64) -> String {
    format!("{repo_full_name}/{number}")
}

static TICKET_ID: OnceLock<Regex> = OnceLock::new();

fn ticket_id(title: &str) -> Option<String> {
    let re = TICKET_ID.get_or_init(|| Regex::new(r"^(.+?[- ]\d+)").expect("ticket id pattern"));
    let id = re.captures(title)?.get(1)?.as_str();
    Some(id.trim().replace(' ', "-").to_uppercase())
}

/// Link into the issue tracker when the PR title starts with a ticket id
/// (e.g. `PROJ-123 fix login`), built against the configured base URL.
pub fn ticket_url(title: &str, base: Option<&str>) -> Option<String> {
    let base = base?;
    let id = ticket_id(title)?;
    Some(format!("{}/{}", base.trim_end_matches('/'), id))
}
