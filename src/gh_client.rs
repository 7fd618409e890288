use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};
use reqwest::{header, StatusCode};
use thiserror::Error;

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("review-reminder/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct GithubUser {
    pub login: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct PullRequestLabel {
    pub name: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub branch: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub user: GithubUser,
    pub html_url: String,
    #[serde(default)]
    pub requested_reviewers: Vec<GithubUser>,
    pub draft: Option<bool>,
    pub labels: Option<Vec<PullRequestLabel>>,
    pub head: PullRequestHead,
}

/// Aggregate state of all status checks run against a branch reference.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CombinedStatusState {
    Error,
    Failure,
    Pending,
    Success,
}

impl CombinedStatusState {
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            CombinedStatusState::Error | CombinedStatusState::Failure
        )
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct CombinedStatus {
    pub state: CombinedStatusState,
}

/// Creation times of the review-request events and review submissions on a
/// pull request, capped at the 50 most recent of each by the query.
#[derive(Clone, Debug)]
pub struct ReviewTimeline {
    pub review_requests: Vec<DateTime<Utc>>,
    pub reviews: Vec<DateTime<Utc>>,
}

impl ReviewTimeline {
    pub fn latest_review_request_time(&self) -> Option<DateTime<Utc>> {
        self.review_requests.iter().copied().max()
    }

    pub fn latest_review_time(&self) -> Option<DateTime<Utc>> {
        self.reviews.iter().copied().max()
    }
}

#[derive(Error, Debug)]
pub enum GithubClientError {
    #[error("Github token is not usable as an http header value")]
    InvalidToken,
    #[error("Request to the github api failed during {operation}: {source}")]
    Request {
        operation: &'static str,
        source: reqwest::Error,
    },
    #[error("Github api returned {status} during {operation}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Got unexpected response body from {operation}: {source}")]
    UnexpectedResponse {
        operation: &'static str,
        source: reqwest::Error,
    },
    #[error("Graphql query was rejected during {operation}: {message}")]
    Graphql {
        operation: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, GithubClientError>;

const REVIEW_TIMELINE_QUERY: &str = "
query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      timelineItems(first: 50, itemTypes: [REVIEW_REQUESTED_EVENT]) {
        nodes {
          __typename
          ... on ReviewRequestedEvent {
            createdAt
          }
        }
      }
      reviews(first: 50, states: [APPROVED, CHANGES_REQUESTED, COMMENTED]) {
        nodes {
          __typename
          ... on PullRequestReview {
            createdAt
          }
        }
      }
    }
  }
}
";

#[derive(Deserialize, Debug)]
struct GraphqlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize, Debug)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct RawTimelineResponse {
    repository: RawTimelineRepository,
}

#[derive(Deserialize, Debug)]
struct RawTimelineRepository {
    #[serde(rename = "pullRequest")]
    pull_request: RawTimelinePullRequest,
}

#[derive(Deserialize, Debug)]
struct RawTimelinePullRequest {
    #[serde(rename = "timelineItems")]
    timeline_items: RawNodeConnection,
    reviews: RawNodeConnection,
}

#[derive(Deserialize, Debug)]
struct RawNodeConnection {
    nodes: Vec<RawTimelineNode>,
}

#[derive(Deserialize, Debug)]
struct RawTimelineNode {
    #[serde(rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
}

impl RawTimelineResponse {
    fn into_timeline(self) -> ReviewTimeline {
        let RawTimelinePullRequest {
            timeline_items,
            reviews,
        } = self.repository.pull_request;

        ReviewTimeline {
            review_requests: timeline_items
                .nodes
                .into_iter()
                .filter_map(|node| node.created_at)
                .collect(),
            reviews: reviews
                .nodes
                .into_iter()
                .filter_map(|node| node.created_at)
                .collect(),
        }
    }
}

async fn checked(operation: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GithubClientError::Status {
        operation,
        status,
        body,
    })
}

pub struct GithubClient {
    client: reqwest::Client,
}

impl GithubClient {
    pub fn new<S: AsRef<str>>(token: S) -> Result<GithubClient> {
        let mut authorization =
            header::HeaderValue::from_str(&format!("Bearer {}", token.as_ref()))
                .map_err(|_| GithubClientError::InvalidToken)?;
        authorization.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, authorization);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|source| GithubClientError::Request {
                operation: "build http client",
                source,
            })?;

        Ok(GithubClient { client })
    }

    pub async fn open_pull_requests(&self, owner: &str, repo: &str) -> Result<Vec<PullRequest>> {
        let operation = "list open pull requests";

        let response = self
            .client
            .get(format!("{GITHUB_API_BASE}/repos/{owner}/{repo}/pulls"))
            .query(&[("state", "open")])
            .send()
            .await
            .map_err(|source| GithubClientError::Request { operation, source })?;

        checked(operation, response)
            .await?
            .json()
            .await
            .map_err(|source| GithubClientError::UnexpectedResponse { operation, source })
    }

    pub async fn combined_status(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<CombinedStatus> {
        let operation = "fetch combined status";

        let response = self
            .client
            .get(format!(
                "{GITHUB_API_BASE}/repos/{owner}/{repo}/commits/{reference}/status"
            ))
            .send()
            .await
            .map_err(|source| GithubClientError::Request { operation, source })?;

        checked(operation, response)
            .await?
            .json()
            .await
            .map_err(|source| GithubClientError::UnexpectedResponse { operation, source })
    }

    pub async fn review_timeline(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<ReviewTimeline> {
        let operation = "fetch review timeline";

        let response = self
            .client
            .post(format!("{GITHUB_API_BASE}/graphql"))
            .json(&serde_json::json!({
                "query": REVIEW_TIMELINE_QUERY,
                "variables": { "owner": owner, "name": repo, "number": number },
            }))
            .send()
            .await
            .map_err(|source| GithubClientError::Request { operation, source })?;

        let parsed: GraphqlResponse<RawTimelineResponse> = checked(operation, response)
            .await?
            .json()
            .await
            .map_err(|source| GithubClientError::UnexpectedResponse { operation, source })?;

        if let Some(errors) = parsed.errors {
            if !errors.is_empty() {
                let message = errors
                    .into_iter()
                    .map(|error| error.message)
                    .collect::<Vec<String>>()
                    .join("; ");
                return Err(GithubClientError::Graphql { operation, message });
            }
        }

        match parsed.data {
            Some(data) => Ok(data.into_timeline()),
            None => Err(GithubClientError::Graphql {
                operation,
                message: "response carried no data".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_list_deserializes() {
        let json = r#"[
            {
                "number": 17,
                "title": "Add request tracing",
                "user": { "login": "bob" },
                "html_url": "https://github.com/acme/widgets/pull/17",
                "requested_reviewers": [{ "login": "alice" }, { "login": "carol" }],
                "draft": false,
                "labels": [{ "name": "backend" }],
                "head": { "ref": "tracing" }
            },
            {
                "number": 18,
                "title": "WIP refactor",
                "user": { "login": "dave" },
                "html_url": "https://github.com/acme/widgets/pull/18",
                "requested_reviewers": [],
                "draft": true,
                "labels": null,
                "head": { "ref": "refactor" }
            }
        ]"#;

        let prs: Vec<PullRequest> = serde_json::from_str(json).unwrap();

        assert_eq!(prs.len(), 2);
        assert_eq!(prs[0].number, 17);
        assert_eq!(prs[0].user.login, "bob");
        assert_eq!(prs[0].requested_reviewers.len(), 2);
        assert_eq!(prs[0].head.branch, "tracing");
        assert_eq!(prs[1].draft, Some(true));
        assert!(prs[1].labels.is_none());
    }

    #[test]
    fn combined_status_state_deserializes() {
        let status: CombinedStatus = serde_json::from_str(r#"{ "state": "failure" }"#).unwrap();
        assert_eq!(status.state, CombinedStatusState::Failure);

        let status: CombinedStatus = serde_json::from_str(r#"{ "state": "pending" }"#).unwrap();
        assert_eq!(status.state, CombinedStatusState::Pending);
    }

    #[test]
    fn error_and_failure_states_are_failing() {
        assert!(CombinedStatusState::Error.is_failing());
        assert!(CombinedStatusState::Failure.is_failing());
        assert!(!CombinedStatusState::Pending.is_failing());
        assert!(!CombinedStatusState::Success.is_failing());
    }

    #[test]
    fn timeline_response_converts_and_picks_latest() {
        let json = r#"{
            "data": {
                "repository": {
                    "pullRequest": {
                        "timelineItems": {
                            "nodes": [
                                { "__typename": "ReviewRequestedEvent", "createdAt": "2024-01-02T10:00:00Z" },
                                { "__typename": "ReviewRequestedEvent", "createdAt": "2024-01-04T09:30:00Z" }
                            ]
                        },
                        "reviews": {
                            "nodes": [
                                { "__typename": "PullRequestReview", "createdAt": "2024-01-03T16:00:00Z" }
                            ]
                        }
                    }
                }
            }
        }"#;

        let parsed: GraphqlResponse<RawTimelineResponse> = serde_json::from_str(json).unwrap();
        let timeline = parsed.data.unwrap().into_timeline();

        assert_eq!(
            timeline.latest_review_request_time(),
            Some("2024-01-04T09:30:00Z".parse().unwrap())
        );
        assert_eq!(
            timeline.latest_review_time(),
            Some("2024-01-03T16:00:00Z".parse().unwrap())
        );
    }

    #[test]
    fn empty_timeline_has_no_latest_times() {
        let timeline = ReviewTimeline {
            review_requests: vec![],
            reviews: vec![],
        };

        assert_eq!(timeline.latest_review_request_time(), None);
        assert_eq!(timeline.latest_review_time(), None);
    }

    #[test]
    fn graphql_errors_deserialize() {
        let json =
            r#"{ "data": null, "errors": [{ "message": "Could not resolve to a Repository" }] }"#;

        let parsed: GraphqlResponse<RawTimelineResponse> = serde_json::from_str(json).unwrap();

        assert!(parsed.data.is_none());
        assert_eq!(
            parsed.errors.unwrap()[0].message,
            "Could not resolve to a Repository"
        );
    }
}
