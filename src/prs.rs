use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, Local, Utc};

use crate::gh_client::{self, GithubClient, PullRequest};

/// Which open pull requests are skipped outright, before any staleness check.
pub struct FilterConfig {
    ignore_authors: HashSet<String>,
    ignore_labels: HashSet<String>,
    ignore_draft_prs: bool,
}

impl FilterConfig {
    pub fn new(ignore_authors: &str, ignore_labels: &str, ignore_draft_prs: bool) -> FilterConfig {
        FilterConfig {
            ignore_authors: parse_name_list(ignore_authors),
            ignore_labels: parse_name_list(ignore_labels),
            ignore_draft_prs,
        }
    }
}

fn parse_name_list(input: &str) -> HashSet<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decide whether to skip this pull request without sending any reminder
/// about it. Matching is case-sensitive for both authors and labels.
pub fn should_ignore(pull_request: &PullRequest, filter: &FilterConfig) -> bool {
    if pull_request.requested_reviewers.is_empty() {
        // Nobody to remind.
        return true;
    }

    if filter.ignore_authors.contains(&pull_request.user.login) {
        return true;
    }

    if filter.ignore_draft_prs && pull_request.draft.unwrap_or(false) {
        return true;
    }

    if let Some(labels) = &pull_request.labels {
        if labels
            .iter()
            .any(|label| filter.ignore_labels.contains(&label.name))
        {
            return true;
        }
    }

    false
}

/// Whether the combined status of the pull request's source branch reports
/// any check as failing. Pending checks do not count as failing.
pub async fn is_failing_status_checks(
    client: &GithubClient,
    owner: &str,
    repo: &str,
    pull_request: &PullRequest,
) -> gh_client::Result<bool> {
    let status = client
        .combined_status(owner, repo, &pull_request.head.branch)
        .await?;

    Ok(status.state.is_failing())
}

/// Whether the latest review request on this pull request has gone
/// unanswered past the deadline.
pub async fn is_missing_review(
    client: &GithubClient,
    owner: &str,
    repo: &str,
    pull_request: &PullRequest,
    review_deadline: Duration,
) -> gh_client::Result<bool> {
    let timeline = client
        .review_timeline(owner, repo, pull_request.number)
        .await?;

    Ok(is_after_review_deadline(
        timeline.latest_review_request_time(),
        timeline.latest_review_time(),
        review_deadline,
        Utc::now(),
    ))
}

fn is_after_review_deadline(
    review_request_time: Option<DateTime<Utc>>,
    review_time: Option<DateTime<Utc>>,
    review_deadline: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(review_request_time) = review_request_time else {
        // No outstanding review request to measure against.
        return false;
    };

    let review_deadline = extend_deadline_over_weekend(review_request_time, review_deadline);
    if now - review_request_time < review_deadline {
        // Still time to review.
        return false;
    }

    if let Some(review_time) = review_time {
        if review_time > review_request_time {
            // The request was already answered.
            return false;
        }
    }

    true
}

/// A deadline that falls on a Saturday or Sunday is extended by exactly two
/// days to land past the weekend. The shift is applied once and not
/// re-checked, so an extended deadline can itself land on a weekend day.
fn extend_deadline_over_weekend(
    review_request_time: DateTime<Utc>,
    review_deadline: Duration,
) -> Duration {
    let due = (review_request_time + review_deadline).with_timezone(&Local);

    if due.weekday().num_days_from_sunday() % 6 == 0 {
        review_deadline + Duration::days(2)
    } else {
        review_deadline
    }
}
