//! Scripted in-memory facade for `--demo`: exercises discovery, approval,
//! staleness, re-approval, bot filtering and closure without a token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::config::{Config, IgnoreBots, RepoConfig};
use crate::error::Result;
use crate::github::{
    CommitDetail, CommitSignature, RawBase, RawCommit, RawPullRequest, RawRepo, RawReview, RawUser,
    ReviewApi,
};
use crate::model::{ReviewVerdict, pull_request_key};

const BILLING: &str = "acme-inc/billing-api";
const WEB: &str = "orbit/web";

/// How many refresh cycles the closing demo PR stays open.
const CLOSES_AFTER_CYCLES: u64 = 2;

pub fn demo_config() -> Config {
    Config {
        token: None,
        repos: vec![
            RepoConfig {
                full_name: BILLING.to_string(),
                default_branch: None,
                refresh_secs: Some(15),
            },
            RepoConfig {
                full_name: WEB.to_string(),
                default_branch: None,
                refresh_secs: Some(10),
            },
        ],
        default_branch: "main".to_string(),
        refresh_secs: 20,
        ignore_bots: Some(IgnoreBots::Flag(true)),
        tickets_url: Some("https://tickets.example.com/browse".to_string()),
    }
}

#[derive(Default)]
struct DemoState {
    /// Completed refresh cycles per pull request key.
    cycles: HashMap<String, u64>,
}

#[derive(Clone, Default)]
pub struct DemoApi {
    state: Arc<Mutex<DemoState>>,
}

impl DemoApi {
    pub fn new() -> Self {
        DemoApi::default()
    }

    fn cycles_for(&self, key: &str) -> u64 {
        *self.state.lock().unwrap().cycles.get(key).unwrap_or(&0)
    }

    fn bump(&self, key: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        let count = state.cycles.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

fn user(login: &str) -> RawUser {
    RawUser {
        login: login.to_string(),
        avatar_url: Some(format!("https://avatars.example/{login}")),
    }
}

fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

fn review(login: &str, state: ReviewVerdict, minutes: i64) -> RawReview {
    RawReview {
        user: user(login),
        state,
        submitted_at: Some(minutes_ago(minutes)),
    }
}

fn pull(
    repo: &str,
    number: u64,
    author: &str,
    title: &str,
    base_branch: &str,
    requested: &[&str],
    state: &str,
) -> RawPullRequest {
    RawPullRequest {
        number,
        title: title.to_string(),
        state: state.to_string(),
        html_url: format!("https://github.com/{repo}/pull/{number}"),
        user: user(author),
        base: RawBase {
            branch: base_branch.to_string(),
            repo: RawRepo {
                full_name: repo.to_string(),
                html_url: Some(format!("https://github.com/{repo}")),
            },
        },
        created_at: minutes_ago(600),
        updated_at: minutes_ago(25),
        requested_reviewers: requested.iter().map(|r| user(r)).collect(),
    }
}

fn billing_842(state: &str) -> RawPullRequest {
    pull(
        BILLING,
        842,
        "anika",
        "BILL-842 Fix idempotency for retries on charge capture",
        "main",
        &["bjorn", "carla"],
        state,
    )
}

fn billing_850() -> RawPullRequest {
    pull(
        BILLING,
        850,
        "dependabot[bot]",
        "Bump serde from 1.0.200 to 1.0.204",
        "main",
        &[],
        "open",
    )
}

fn web_1932(state: &str) -> RawPullRequest {
    pull(
        WEB,
        1932,
        "santiago",
        "ORB-1932 Add keyboard navigation to project switcher",
        "develop",
        &["amara"],
        state,
    )
}

fn web_1940(state: &str) -> RawPullRequest {
    pull(
        WEB,
        1940,
        "sofia",
        "Fix flaky onboarding test on CI runners",
        "main",
        &["amara"],
        state,
    )
}

impl ReviewApi for DemoApi {
    async fn list_pull_requests(&self, repo: &str) -> Result<Vec<RawPullRequest>> {
        let mut pulls = match repo {
            BILLING => vec![billing_842("open"), billing_850()],
            WEB => vec![web_1932("open"), web_1940("open")],
            _ => Vec::new(),
        };
        // The closing PR leaves the listing once it has closed, like a real
        // open-PR listing would.
        let closing_key = pull_request_key(WEB, 1940);
        if self.cycles_for(&closing_key) >= CLOSES_AFTER_CYCLES {
            pulls.retain(|p| !(repo == WEB && p.number == 1940));
        }
        Ok(pulls)
    }

    async fn list_reviews(&self, repo: &str, number: u64) -> Result<Vec<RawReview>> {
        let key = pull_request_key(repo, number);
        let cycle = self.cycles_for(&key);
        let reviews = match (repo, number) {
            // One commit landed ten minutes ago, so the first approval is
            // stale until bjorn re-approves and carla joins.
            (BILLING, 842) => match cycle {
                0 => Vec::new(),
                1 => vec![review("bjorn", ReviewVerdict::Approved, 30)],
                _ => vec![
                    review("bjorn", ReviewVerdict::Approved, 30),
                    review("bjorn", ReviewVerdict::Approved, 5),
                    review("carla", ReviewVerdict::Approved, 3),
                ],
            },
            (WEB, 1932) => match cycle {
                0 => vec![review("amara", ReviewVerdict::Commented, 20)],
                _ => vec![
                    review("amara", ReviewVerdict::Commented, 20),
                    review("amara", ReviewVerdict::ChangesRequested, 12),
                ],
            },
            _ => Vec::new(),
        };
        Ok(reviews)
    }

    async fn list_commits(&self, _repo: &str, _number: u64) -> Result<Vec<RawCommit>> {
        Ok(vec![RawCommit {
            commit: CommitDetail {
                committer: CommitSignature {
                    date: minutes_ago(10),
                },
            },
        }])
    }

    async fn get_pull_request(&self, repo: &str, number: u64) -> Result<RawPullRequest> {
        let key = pull_request_key(repo, number);
        let cycle = self.bump(&key);
        let pr = match (repo, number) {
            (BILLING, 842) => billing_842("open"),
            (BILLING, 850) => billing_850(),
            (WEB, 1932) => web_1932("open"),
            (WEB, 1940) => {
                let state = if cycle >= CLOSES_AFTER_CYCLES {
                    "closed"
                } else {
                    "open"
                };
                web_1940(state)
            }
            _ => pull(repo, number, "alice", "unknown", "main", &[], "open"),
        };
        Ok(pr)
    }
}
