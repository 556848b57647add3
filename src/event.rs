use crate::model::TrackedPullRequest;

/// Which schedule a tick belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerScope {
    /// The repository-wide discovery countdown.
    WatchList,
    /// A single pull request's refresh countdown, by key.
    PullRequest(String),
}

/// Outbound signals from the engine to the presentation layer. The engine
/// never dictates markup; consumers project this data however they like.
#[derive(Debug, Clone)]
pub enum Event {
    PullRequestDiscovered(TrackedPullRequest),
    PullRequestUpdated(TrackedPullRequest),
    PullRequestRemoved(String),
    TimerTick { scope: TimerScope, value: String },
}
