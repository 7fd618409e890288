use std::collections::HashMap;

use serde::Serialize;

use crate::gh_client::PullRequest;

/// Body posted to the Twist integration url.
#[derive(Clone, Serialize, Debug)]
pub struct Reminder {
    pub content: String,
    pub recipients: Vec<u64>,
}

/// Outcome of a delivery attempt as reported by the messaging endpoint.
#[derive(Clone, Debug)]
pub struct DeliveryStatus {
    pub code: u16,
    pub message: String,
}

impl DeliveryStatus {
    /// Anything at or above 300, redirects included, is a failed delivery.
    pub fn is_failure(&self) -> bool {
        self.code >= 300
    }
}

/// Parse a `username:twist_user_id,username:twist_user_id` string (eg
/// `bob:123,jane:456`) into a map of Github usernames to Twist user ids.
/// Entries missing either half, or with an id that is not a number, are
/// skipped.
pub fn parse_author_mapping(input: &str) -> HashMap<String, u64> {
    let mut mapping = HashMap::new();

    for entry in input.split(',') {
        let Some((username, twist_user_id)) = entry.split_once(':') else {
            continue;
        };

        if username.is_empty() {
            continue;
        }

        let Ok(twist_user_id) = twist_user_id.parse() else {
            continue;
        };

        mapping.insert(username.to_string(), twist_user_id);
    }

    mapping
}

/// Fill the message template with the details of the pull request. Reviewers
/// with a Twist mapping are rendered as mention tokens and collected as
/// recipients; unmapped reviewers appear as plain usernames. Each
/// placeholder is substituted at its first occurrence only.
pub fn compose_reminder(
    pull_request: &PullRequest,
    message_template: &str,
    author_to_twist: &HashMap<String, u64>,
) -> Reminder {
    let mut recipients = Vec::new();

    let reviewers = pull_request
        .requested_reviewers
        .iter()
        .map(|reviewer| match author_to_twist.get(&reviewer.login) {
            Some(&twist_user_id) => {
                recipients.push(twist_user_id);
                format!("[{}](twist-mention://{})", reviewer.login, twist_user_id)
            }
            None => reviewer.login.clone(),
        })
        .collect::<Vec<String>>()
        .join(", ");

    let content = message_template
        .replacen("%reviewer%", &reviewers, 1)
        .replacen("%pr_number%", &pull_request.number.to_string(), 1)
        .replacen("%pr_title%", &pull_request.title, 1)
        .replacen("%pr_url%", &pull_request.html_url, 1);

    Reminder {
        content,
        recipients,
    }
}

/// Post the reminder to the Twist integration url. A response with an error
/// status is not an `Err`; the caller inspects the returned code.
pub async fn post_reminder(
    client: &reqwest::Client,
    twist_url: &str,
    reminder: &Reminder,
) -> Result<DeliveryStatus, reqwest::Error> {
    let response = client.post(twist_url).json(reminder).send().await?;
    let status = response.status();

    Ok(DeliveryStatus {
        code: status.as_u16(),
        message: status.canonical_reason().unwrap_or_default().to_string(),
    })
}
