mod gh_client;
mod prs;
mod twist;

use std::{env, path::PathBuf};

use anyhow::bail;
use chrono::Duration;
use clap::Parser;
use gh_client::GithubClient;
use log::{error, info};
use prs::FilterConfig;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(
        short,
        long,
        help = "path to config file, also set by REVIEW_REMINDER_CONFIG_FILE env variable"
    )]
    config: Option<PathBuf>,
}

#[derive(Clone, Deserialize)]
struct Config {
    repository: String,
    token: Option<String>,
    review_time_ms: i64,
    twist_url: String,
    message: String,
    ignore_draft_prs: bool,
    ignore_prs_with_failing_checks: bool,
    #[serde(default)]
    ignore_authors: String,
    #[serde(default)]
    ignore_labels: String,
    #[serde(default)]
    author_to_twist_mapping: String,
}

const CONFIG_FILENAME: &str = "review-reminder.toml";

fn config_directory() -> PathBuf {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or(PathBuf::from(env::var("HOME").ok().unwrap()).join(".config"))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config_path = args
        .config
        .clone()
        .or(env::var("REVIEW_REMINDER_CONFIG_FILE").ok().map(|s| s.into()))
        .unwrap_or(config_directory().join(CONFIG_FILENAME));

    let Ok(config_contents) = std::fs::read_to_string(&config_path) else {
        bail!("Need to provide a config file, path is specified in args, as REVIEW_REMINDER_CONFIG_FILE env var or at XDG_CONFIG_HOME/{CONFIG_FILENAME}")
    };

    let config: Config = match toml::from_str(&config_contents) {
        Ok(config) => config,
        Err(e) => bail!("Could not parse config: {e}"),
    };

    Ok(config)
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let Some((owner, repo)) = config.repository.split_once('/') else {
        bail!(
            "Repository must be in 'owner/name' form, got '{}'",
            config.repository
        )
    };

    let Some(token) = config.token.clone().or(env::var("GITHUB_TOKEN").ok()) else {
        bail!("Need a github token, either as 'token' in the config or the GITHUB_TOKEN env variable")
    };

    let review_deadline = Duration::milliseconds(config.review_time_ms);
    let filter = FilterConfig::new(
        &config.ignore_authors,
        &config.ignore_labels,
        config.ignore_draft_prs,
    );
    let author_to_twist = twist::parse_author_mapping(&config.author_to_twist_mapping);

    let github_client = GithubClient::new(&token)?;
    let twist_client = reqwest::Client::new();

    for pull_request in github_client.open_pull_requests(owner, repo).await? {
        if prs::should_ignore(&pull_request, &filter) {
            info!(
                "Ignoring #{} \"{}\"",
                pull_request.number, pull_request.title
            );
            continue;
        }

        if config.ignore_prs_with_failing_checks
            && prs::is_failing_status_checks(&github_client, owner, repo, &pull_request).await?
        {
            info!(
                "Ignoring #{} \"{}\" as the status checks are failing",
                pull_request.number, pull_request.title
            );
            continue;
        }

        info!(
            "Checking #{} \"{}\"",
            pull_request.number, pull_request.title
        );
        if !prs::is_missing_review(&github_client, owner, repo, &pull_request, review_deadline)
            .await?
        {
            continue;
        }

        info!("Sending reminder");
        let reminder = twist::compose_reminder(&pull_request, &config.message, &author_to_twist);
        let delivery = twist::post_reminder(&twist_client, &config.twist_url, &reminder).await?;

        if delivery.is_failure() {
            bail!(
                "Cannot post message to Twist: {} - {}",
                delivery.code,
                delivery.message
            );
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_env().unwrap();

    let args = Args::parse();
    let config = load_config(&args)?;

    if let Err(e) = run(&config).await {
        error!("{e:#}");
        std::process::exit(1);
    }

    Ok(())
}
