//! Per-pull-request polling. Each tracker owns one watched pull request,
//! refreshes it on its own cadence and reports through the event channel.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, WatchError};
use crate::event::{Event, TimerScope};
use crate::github::{RawPullRequest, RawUser, ReviewApi};
use crate::model::{ReviewerStatus, TrackedPullRequest, pull_request_key, ticket_url};
use crate::reconcile::{is_ready, reconcile};
use crate::timer::{Direction, Timer};

#[derive(Debug)]
enum CycleOutcome {
    Open,
    Closed,
}

pub struct PullRequestTracker<A> {
    api: A,
    state: TrackedPullRequest,
    /// Requested reviewers from the freshest PR record; seeds the next
    /// reconcile's required set.
    requested: Vec<RawUser>,
    default_branch: String,
    refresh: Duration,
    tickets_url: Option<String>,
    events: mpsc::UnboundedSender<Event>,
    /// Tells the watch list to drop this key once the PR leaves "open".
    closed: mpsc::UnboundedSender<String>,
    timer: Timer,
    /// When the aggregate last merged a successful cycle.
    last_success: Option<Instant>,
}

impl<A: ReviewApi> PullRequestTracker<A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: A,
        raw: RawPullRequest,
        repo_full_name: &str,
        default_branch: String,
        refresh: Duration,
        tickets_url: Option<String>,
        events: mpsc::UnboundedSender<Event>,
        closed: mpsc::UnboundedSender<String>,
    ) -> Self {
        let mut reviewers = BTreeMap::new();
        for user in &raw.requested_reviewers {
            if user.login == raw.user.login {
                continue;
            }
            reviewers.insert(
                user.login.clone(),
                ReviewerStatus {
                    avatar_url: user.avatar_url.clone(),
                    ..ReviewerStatus::default()
                },
            );
        }

        let state = TrackedPullRequest {
            key: pull_request_key(repo_full_name, raw.number),
            repo: repo_full_name.to_string(),
            number: raw.number,
            title: raw.title.clone(),
            author: raw.user.login.clone(),
            author_avatar: raw.user.avatar_url.clone(),
            html_url: raw.html_url.clone(),
            base_branch: raw.base.branch.clone(),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            reviewers,
            ready: false,
            branch_mismatch: raw.base.branch != default_branch,
            ticket_url: ticket_url(&raw.title, tickets_url.as_deref()),
        };

        PullRequestTracker {
            api,
            state,
            requested: raw.requested_reviewers,
            default_branch,
            refresh,
            tickets_url,
            events,
            closed,
            timer: Timer::new(),
            last_success: None,
        }
    }

    /// Snapshot of the aggregate as currently known.
    pub fn tracked(&self) -> &TrackedPullRequest {
        &self.state
    }

    /// Polls until the pull request leaves the "open" state. A failed cycle
    /// keeps the previous aggregate and counts up its age until the next
    /// attempt; a successful one counts down to it.
    pub async fn run(mut self) {
        loop {
            match self.cycle().await {
                Ok(CycleOutcome::Open) => {
                    self.last_success = Some(Instant::now());
                    self.wait_for_next_cycle().await;
                }
                Ok(CycleOutcome::Closed) => {
                    self.timer.stop();
                    let _ = self.closed.send(self.state.key.clone());
                    let _ = self
                        .events
                        .send(Event::PullRequestRemoved(self.state.key.clone()));
                    debug!(key = %self.state.key, "pull request closed; tracker removed");
                    return;
                }
                Err(err) => {
                    warn!(key = %self.state.key, error = %err, "refresh cycle failed; retrying on next interval");
                    self.wait_with_stale_data().await;
                }
            }
        }
    }

    /// One refresh: reviews, then commits, reconcile, then the fresh PR
    /// record. The sequence matters: staleness needs the latest commit and
    /// the final merge needs the freshest metadata.
    async fn cycle(&mut self) -> Result<CycleOutcome> {
        let reviews = self
            .api
            .list_reviews(&self.state.repo, self.state.number)
            .await?;
        let commits = self
            .api
            .list_commits(&self.state.repo, self.state.number)
            .await?;
        let latest_commit = commits
            .last()
            .map(|c| c.commit.committer.date)
            .ok_or_else(|| {
                WatchError::MalformedResponse(format!(
                    "{}: pull request has no commits",
                    self.state.key
                ))
            })?;

        let required: Vec<String> = self.requested.iter().map(|u| u.login.clone()).collect();
        let statuses = reconcile(&required, &reviews, &self.state.author, latest_commit);
        self.merge_statuses(statuses);

        let fresh = self
            .api
            .get_pull_request(&self.state.repo, self.state.number)
            .await?;
        self.apply_refreshed(&fresh);

        self.state.branch_mismatch = self.state.base_branch != self.default_branch;
        self.state.ready = is_ready(&self.state.reviewers);

        if fresh.state != "open" {
            return Ok(CycleOutcome::Closed);
        }
        let _ = self
            .events
            .send(Event::PullRequestUpdated(self.state.clone()));
        Ok(CycleOutcome::Open)
    }

    /// New reviewers are appended, existing ones replaced with their current
    /// status. Entries are never deleted here; a reviewer disappears only
    /// with the whole pull request.
    fn merge_statuses(&mut self, statuses: BTreeMap<String, ReviewerStatus>) {
        for (login, mut status) in statuses {
            if status.avatar_url.is_none() {
                if let Some(known) = self.state.reviewers.get(&login) {
                    status.avatar_url = known.avatar_url.clone();
                }
            }
            self.state.reviewers.insert(login, status);
        }
    }

    /// Folds the freshest PR record in: title, timestamps, base branch, and
    /// placeholder entries for reviewers requested but yet to review.
    fn apply_refreshed(&mut self, fresh: &RawPullRequest) {
        self.state.title = fresh.title.clone();
        self.state.updated_at = fresh.updated_at;
        self.state.base_branch = fresh.base.branch.clone();
        self.state.html_url = fresh.html_url.clone();
        self.state.ticket_url = ticket_url(&fresh.title, self.tickets_url.as_deref());

        for user in &fresh.requested_reviewers {
            if user.login == self.state.author {
                continue;
            }
            let entry = self
                .state
                .reviewers
                .entry(user.login.clone())
                .or_default();
            if entry.avatar_url.is_none() {
                entry.avatar_url = user.avatar_url.clone();
            }
        }
        self.requested = fresh.requested_reviewers.clone();
    }

    async fn wait_for_next_cycle(&mut self) {
        let (done_tx, done_rx) = oneshot::channel();
        let events = self.events.clone();
        let key = self.state.key.clone();
        self.timer.start(
            Direction::CountDown,
            self.refresh,
            move |value| {
                let _ = events.send(Event::TimerTick {
                    scope: TimerScope::PullRequest(key.clone()),
                    value,
                });
            },
            Some(Box::new(move || {
                let _ = done_tx.send(());
            })),
        );
        let _ = done_rx.await;
    }

    /// Waits out the same refresh interval, but the ticks count up how old
    /// the held data is instead of down to the next attempt.
    async fn wait_with_stale_data(&mut self) {
        let age = self
            .last_success
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);
        let events = self.events.clone();
        let key = self.state.key.clone();
        self.timer.start(
            Direction::CountUp,
            age,
            move |value| {
                let _ = events.send(Event::TimerTick {
                    scope: TimerScope::PullRequest(key.clone()),
                    value,
                });
            },
            None,
        );
        tokio::time::sleep(self.refresh).await;
        self.timer.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{CommitDetail, CommitSignature, RawBase, RawCommit, RawRepo, RawReview};
    use crate::model::ReviewVerdict;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, hour, 0, 0).unwrap()
    }

    fn user(login: &str) -> RawUser {
        RawUser {
            login: login.to_string(),
            avatar_url: Some(format!("https://avatars.example/{login}")),
        }
    }

    fn raw_pr(number: u64, author: &str, state: &str, requested: &[&str]) -> RawPullRequest {
        RawPullRequest {
            number,
            title: format!("PR number {number}"),
            state: state.to_string(),
            html_url: format!("https://github.com/acme/widgets/pull/{number}"),
            user: user(author),
            base: RawBase {
                branch: "main".to_string(),
                repo: RawRepo {
                    full_name: "acme/widgets".to_string(),
                    html_url: None,
                },
            },
            created_at: at(8),
            updated_at: at(9),
            requested_reviewers: requested.iter().map(|r| user(r)).collect(),
        }
    }

    fn commit(date: DateTime<Utc>) -> RawCommit {
        RawCommit {
            commit: CommitDetail {
                committer: CommitSignature { date },
            },
        }
    }

    fn review(login: &str, state: ReviewVerdict, submitted: DateTime<Utc>) -> RawReview {
        RawReview {
            user: user(login),
            state,
            submitted_at: Some(submitted),
        }
    }

    /// Scripted facade: each call pops the next canned response.
    #[derive(Clone, Default)]
    struct FakeApi {
        reviews: Arc<Mutex<VecDeque<Result<Vec<RawReview>>>>>,
        commits: Arc<Mutex<VecDeque<Result<Vec<RawCommit>>>>>,
        pulls: Arc<Mutex<VecDeque<Result<RawPullRequest>>>>,
    }

    impl FakeApi {
        fn push_cycle(&self, reviews: Vec<RawReview>, commits: Vec<RawCommit>, pr: RawPullRequest) {
            self.reviews.lock().unwrap().push_back(Ok(reviews));
            self.commits.lock().unwrap().push_back(Ok(commits));
            self.pulls.lock().unwrap().push_back(Ok(pr));
        }
    }

    impl ReviewApi for FakeApi {
        async fn list_pull_requests(&self, _repo: &str) -> Result<Vec<RawPullRequest>> {
            Ok(Vec::new())
        }

        async fn list_reviews(&self, _repo: &str, _number: u64) -> Result<Vec<RawReview>> {
            self.reviews
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn list_commits(&self, _repo: &str, _number: u64) -> Result<Vec<RawCommit>> {
            self.commits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![commit(at(8))]))
        }

        async fn get_pull_request(&self, _repo: &str, number: u64) -> Result<RawPullRequest> {
            self.pulls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(raw_pr(number, "alice", "open", &[])))
        }
    }

    fn tracker_for(
        api: FakeApi,
        raw: RawPullRequest,
    ) -> (
        PullRequestTracker<FakeApi>,
        mpsc::UnboundedReceiver<Event>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let tracker = PullRequestTracker::new(
            api,
            raw,
            "acme/widgets",
            "main".to_string(),
            Duration::from_secs(2),
            None,
            events_tx,
            closed_tx,
        );
        (tracker, events_rx, closed_rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn discovery_seeds_placeholders_for_requested_reviewers() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (closed_tx, _closed_rx) = mpsc::unbounded_channel();
        let tracker = PullRequestTracker::new(
            FakeApi::default(),
            raw_pr(42, "alice", "open", &["bob", "carol", "alice"]),
            "acme/widgets",
            "main".to_string(),
            Duration::from_secs(60),
            None,
            events_tx,
            closed_tx,
        );
        let tracked = tracker.tracked();
        assert_eq!(tracked.key, "acme/widgets/42");
        assert_eq!(tracked.reviewers.len(), 2, "author placeholder is dropped");
        assert_eq!(tracked.reviewers["bob"].state, None);
        assert!(!tracked.ready);
        assert!(!tracked.branch_mismatch);
    }

    #[tokio::test]
    async fn cycle_reconciles_and_reports_ready() {
        let api = FakeApi::default();
        api.push_cycle(
            vec![
                review("bob", ReviewVerdict::Approved, at(13)),
                review("carol", ReviewVerdict::Approved, at(14)),
            ],
            vec![commit(at(10)), commit(at(12))],
            raw_pr(42, "alice", "open", &[]),
        );

        let (mut tracker, mut events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &["bob", "carol"]));
        tracker.cycle().await.unwrap();

        let events = drain(&mut events_rx);
        assert_eq!(events.len(), 1);
        let Event::PullRequestUpdated(pr) = &events[0] else {
            panic!("expected an update event");
        };
        assert!(pr.ready);
        assert_eq!(pr.reviewers["bob"].state, Some(ReviewVerdict::Approved));
        assert!(!pr.reviewers["bob"].stale);
    }

    #[tokio::test]
    async fn stale_approval_blocks_ready() {
        let api = FakeApi::default();
        api.push_cycle(
            vec![review("bob", ReviewVerdict::Approved, at(9))],
            vec![commit(at(12))],
            raw_pr(42, "alice", "open", &[]),
        );

        let (mut tracker, mut events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &["bob"]));
        tracker.cycle().await.unwrap();

        let events = drain(&mut events_rx);
        let Event::PullRequestUpdated(pr) = &events[0] else {
            panic!("expected an update event");
        };
        assert!(pr.reviewers["bob"].stale);
        assert!(!pr.ready);
    }

    #[tokio::test]
    async fn fresh_record_adds_placeholders_and_refreshes_title() {
        let api = FakeApi::default();
        let mut fresh = raw_pr(42, "alice", "open", &["carol"]);
        fresh.title = "PROJ-9 retitled".to_string();
        api.push_cycle(
            vec![review("bob", ReviewVerdict::Approved, at(13))],
            vec![commit(at(12))],
            fresh,
        );

        let (mut tracker, mut events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &["bob"]));
        tracker.cycle().await.unwrap();

        let events = drain(&mut events_rx);
        let Event::PullRequestUpdated(pr) = &events[0] else {
            panic!("expected an update event");
        };
        assert_eq!(pr.title, "PROJ-9 retitled");
        assert_eq!(pr.reviewers["carol"].state, None);
        assert!(!pr.ready, "the new placeholder blocks readiness");
    }

    #[tokio::test]
    async fn base_branch_change_flags_mismatch() {
        let api = FakeApi::default();
        let mut fresh = raw_pr(42, "alice", "open", &[]);
        fresh.base.branch = "release-1.4".to_string();
        api.push_cycle(vec![], vec![commit(at(12))], fresh);

        let (mut tracker, mut events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &["bob"]));
        tracker.cycle().await.unwrap();

        let events = drain(&mut events_rx);
        let Event::PullRequestUpdated(pr) = &events[0] else {
            panic!("expected an update event");
        };
        assert!(pr.branch_mismatch);
    }

    #[tokio::test]
    async fn reviewer_entries_survive_an_empty_reconcile() {
        let api = FakeApi::default();
        api.push_cycle(
            vec![review("dave", ReviewVerdict::Approved, at(13))],
            vec![commit(at(12))],
            raw_pr(42, "alice", "open", &[]),
        );
        api.push_cycle(vec![], vec![commit(at(12))], raw_pr(42, "alice", "open", &[]));

        let (mut tracker, mut events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &[]));
        tracker.cycle().await.unwrap();
        tracker.cycle().await.unwrap();

        let events = drain(&mut events_rx);
        let Event::PullRequestUpdated(pr) = events.last().unwrap() else {
            panic!("expected an update event");
        };
        assert!(pr.reviewers.contains_key("dave"));
    }

    #[tokio::test]
    async fn transport_failure_aborts_cycle_without_events() {
        let api = FakeApi::default();
        api.reviews
            .lock()
            .unwrap()
            .push_back(Err(WatchError::Transport("boom".to_string())));

        let (mut tracker, mut events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &["bob"]));
        let err = tracker.cycle().await.unwrap_err();
        assert!(matches!(err, WatchError::Transport(_)));
        assert!(drain(&mut events_rx).is_empty());
        assert_eq!(tracker.tracked().reviewers["bob"].state, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_counts_up_the_age_of_held_data() {
        let api = FakeApi::default();
        api.reviews
            .lock()
            .unwrap()
            .push_back(Err(WatchError::Transport("boom".to_string())));

        let (mut tracker, mut events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &[]));
        assert!(tracker.cycle().await.is_err());
        tracker.wait_with_stale_data().await;

        let ticks: Vec<String> = drain(&mut events_rx)
            .into_iter()
            .filter_map(|ev| match ev {
                Event::TimerTick {
                    scope: TimerScope::PullRequest(_),
                    value,
                } => Some(value),
                _ => None,
            })
            .collect();
        // No cycle has succeeded yet, so the age starts at zero and rises.
        assert!(ticks.starts_with(&["0s".to_string(), "1s".to_string()]));
    }

    #[tokio::test]
    async fn empty_commit_list_is_malformed() {
        let api = FakeApi::default();
        api.push_cycle(vec![], vec![], raw_pr(42, "alice", "open", &[]));

        let (mut tracker, _events_rx, _closed) =
            tracker_for(api, raw_pr(42, "alice", "open", &[]));
        let err = tracker.cycle().await.unwrap_err();
        assert!(matches!(err, WatchError::MalformedResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_emits_exactly_one_removal_and_releases_the_key() {
        let api = FakeApi::default();
        api.push_cycle(vec![], vec![commit(at(10))], raw_pr(42, "alice", "open", &[]));
        api.push_cycle(vec![], vec![commit(at(10))], raw_pr(42, "alice", "closed", &[]));

        let (tracker, mut events_rx, mut closed_rx) =
            tracker_for(api, raw_pr(42, "alice", "open", &["bob"]));
        let handle = tokio::spawn(tracker.run());

        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.await.unwrap();

        let events = drain(&mut events_rx);
        let removals: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::PullRequestRemoved(_)))
            .collect();
        assert_eq!(removals.len(), 1);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::TimerTick { scope: TimerScope::PullRequest(_), .. })),
            "the refresh countdown ticks between cycles"
        );
        assert_eq!(closed_rx.try_recv().unwrap(), "acme/widgets/42");
    }
}
