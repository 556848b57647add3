//! Folds raw review events into the current-status-per-reviewer table and
//! derives the "ready" signal.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::github::RawReview;
use crate::model::{ReviewVerdict, ReviewerStatus};

/// Builds the reviewer-status table for one pull request.
///
/// Seeds one entry per required reviewer and one per login that submitted a
/// review, excluding the author entirely. Reviews are folded in their given
/// chronological order with a last-meaningful-review-wins rule: a COMMENTED
/// review never overwrites a standing APPROVED or CHANGES_REQUESTED verdict
/// (neither its state nor its timestamp); any other state replaces the prior
/// one. Entries with a recorded review are stamped stale when it predates
/// `latest_commit`.
pub fn reconcile(
    required: &[String],
    reviews: &[RawReview],
    author: &str,
    latest_commit: DateTime<Utc>,
) -> BTreeMap<String, ReviewerStatus> {
    let mut statuses: BTreeMap<String, ReviewerStatus> = BTreeMap::new();

    for login in required {
        if login == author {
            continue;
        }
        statuses.entry(login.clone()).or_default();
    }

    for review in reviews {
        let login = &review.user.login;
        if login == author {
            continue;
        }
        let entry = statuses.entry(login.clone()).or_default();
        if entry.avatar_url.is_none() {
            entry.avatar_url = review.user.avatar_url.clone();
        }

        let standing = matches!(
            entry.state,
            Some(ReviewVerdict::Approved | ReviewVerdict::ChangesRequested)
        );
        if review.state == ReviewVerdict::Commented && standing {
            continue;
        }
        entry.state = Some(review.state);
        entry.submitted_at = review.submitted_at;
    }

    for status in statuses.values_mut() {
        status.stale = status
            .submitted_at
            .is_some_and(|submitted| submitted < latest_commit);
    }

    statuses
}

/// A pull request is ready iff the table is non-empty and every entry holds a
/// fresh approval. An empty table is never ready.
pub fn is_ready(statuses: &BTreeMap<String, ReviewerStatus>) -> bool {
    !statuses.is_empty()
        && statuses
            .values()
            .all(|s| s.state == Some(ReviewVerdict::Approved) && !s.stale)
}
