//! Top-level polling loop: discovers pull requests per configured repository
//! and owns the watched-key set and tracker lifecycles.

use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::{Config, RepoConfig};
use crate::event::{Event, TimerScope};
use crate::github::{RawPullRequest, ReviewApi};
use crate::model::pull_request_key;
use crate::timer::{Direction, Timer};
use crate::tracker::PullRequestTracker;

pub struct WatchList<A> {
    api: A,
    config: Config,
    watched: HashSet<String>,
    events: mpsc::UnboundedSender<Event>,
    closed_tx: mpsc::UnboundedSender<String>,
    closed_rx: mpsc::UnboundedReceiver<String>,
    timer: Timer,
}

impl<A: ReviewApi + Clone> WatchList<A> {
    pub fn new(api: A, config: Config, events: mpsc::UnboundedSender<Event>) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        WatchList {
            api,
            config,
            watched: HashSet::new(),
            events,
            closed_tx,
            closed_rx,
            timer: Timer::new(),
        }
    }

    /// Scans forever on the global refresh cadence. Trackers run on their own
    /// cadence and only report back here when their pull request closes.
    pub async fn run(mut self) {
        loop {
            self.drain_closed();
            self.scan().await;
            self.wait_for_next_scan().await;
        }
    }

    /// Releases keys whose trackers exited, so a reopened pull request is
    /// re-discovered as a new entity.
    fn drain_closed(&mut self) {
        while let Ok(key) = self.closed_rx.try_recv() {
            self.watched.remove(&key);
        }
    }

    async fn scan(&mut self) {
        debug!("scanning repositories for new pull requests");
        let repos = self.config.repos.clone();
        for repo in &repos {
            match self.api.list_pull_requests(&repo.full_name).await {
                Ok(pulls) => {
                    for raw in pulls {
                        self.track(repo, raw);
                    }
                }
                Err(err) => {
                    // One repository's failure never halts the others.
                    warn!(repo = %repo.full_name, error = %err, "listing pull requests failed");
                }
            }
        }
    }

    fn track(&mut self, repo: &RepoConfig, raw: RawPullRequest) {
        let key = pull_request_key(&repo.full_name, raw.number);
        if self.watched.contains(&key) {
            return;
        }
        if self.config.is_ignored_author(&raw.user.login) {
            debug!(%key, author = %raw.user.login, "skipping ignored author");
            return;
        }
        self.watched.insert(key);

        let tracker = PullRequestTracker::new(
            self.api.clone(),
            raw,
            &repo.full_name,
            self.config.branch_for(repo),
            self.config.refresh_for(repo),
            self.config.tickets_url.clone(),
            self.events.clone(),
            self.closed_tx.clone(),
        );
        let _ = self
            .events
            .send(Event::PullRequestDiscovered(tracker.tracked().clone()));
        tokio::spawn(tracker.run());
    }

    async fn wait_for_next_scan(&mut self) {
        let (done_tx, done_rx) = oneshot::channel();
        let events = self.events.clone();
        self.timer.start(
            Direction::CountDown,
            self.config.refresh_time(),
            move |value| {
                let _ = events.send(Event::TimerTick {
                    scope: TimerScope::WatchList,
                    value,
                });
            },
            Some(Box::new(move || {
                let _ = done_tx.send(());
            })),
        );
        let _ = done_rx.await;
    }
}
