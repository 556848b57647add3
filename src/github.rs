//! GitHub REST facade: wire-shaped records and the `ReviewApi` seam the
//! tracker and controller poll through.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use octocrab::Octocrab;

use crate::error::{Result, WatchError};
use crate::model::ReviewVerdict;

/// Ceiling on any single API round trip. A stalled fetch fails the cycle
/// instead of hanging the tracker until the connection dies.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One page is the whole result set; pagination is out of scope.
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawUser {
    pub login: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawRepo {
    pub full_name: String,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawBase {
    #[serde(rename = "ref")]
    pub branch: String,
    pub repo: RawRepo,
}

/// API-shaped pull request record.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawPullRequest {
    pub number: u64,
    pub title: String,
    /// `"open"` or `"closed"`.
    pub state: String,
    pub html_url: String,
    pub user: RawUser,
    pub base: RawBase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub requested_reviewers: Vec<RawUser>,
}

/// One review event. `submitted_at` is absent for PENDING reviews.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawReview {
    pub user: RawUser,
    pub state: ReviewVerdict,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawCommit {
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CommitDetail {
    pub committer: CommitSignature,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CommitSignature {
    pub date: DateTime<Utc>,
}

/// The four operations the polling engine depends on. Every call is a fresh
/// round trip; no caching, no retry.
pub trait ReviewApi: Send + Sync + 'static {
    fn list_pull_requests(
        &self,
        repo: &str,
    ) -> impl Future<Output = Result<Vec<RawPullRequest>>> + Send;

    fn list_reviews(
        &self,
        repo: &str,
        number: u64,
    ) -> impl Future<Output = Result<Vec<RawReview>>> + Send;

    fn list_commits(
        &self,
        repo: &str,
        number: u64,
    ) -> impl Future<Output = Result<Vec<RawCommit>>> + Send;

    fn get_pull_request(
        &self,
        repo: &str,
        number: u64,
    ) -> impl Future<Output = Result<RawPullRequest>> + Send;
}

/// Production facade over octocrab with uniform token auth.
#[derive(Clone)]
pub struct GithubApi {
    octo: Octocrab,
}

impl GithubApi {
    pub fn new(token: &str) -> Result<Self> {
        let octo = Octocrab::builder()
            .personal_token(token.to_string())
            .build()?;
        Ok(GithubApi { octo })
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, route: String) -> Result<T> {
        let request = self.octo.get::<T, _, ()>(&route, None);
        match tokio::time::timeout(REQUEST_TIMEOUT, request).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(WatchError::Transport(format!(
                "request timed out after {}s: {route}",
                REQUEST_TIMEOUT.as_secs()
            ))),
        }
    }
}

impl ReviewApi for GithubApi {
    async fn list_pull_requests(&self, repo: &str) -> Result<Vec<RawPullRequest>> {
        self.fetch(format!("/repos/{repo}/pulls?per_page={PAGE_SIZE}"))
            .await
    }

    async fn list_reviews(&self, repo: &str, number: u64) -> Result<Vec<RawReview>> {
        self.fetch(format!(
            "/repos/{repo}/pulls/{number}/reviews?per_page={PAGE_SIZE}"
        ))
        .await
    }

    async fn list_commits(&self, repo: &str, number: u64) -> Result<Vec<RawCommit>> {
        self.fetch(format!(
            "/repos/{repo}/pulls/{number}/commits?per_page={PAGE_SIZE}"
        ))
        .await
    }

    async fn get_pull_request(&self, repo: &str, number: u64) -> Result<RawPullRequest> {
        self.fetch(format!("/repos/{repo}/pulls/{number}")).await
    }
}
