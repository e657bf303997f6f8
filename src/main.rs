use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
use config::SpecwatchConfig;

mod github;
use github::GitHubClient;

mod pipeline;
use pipeline::Pipeline;

pub(crate) mod utils;

mod validation;
use validation::{OpenApiLinter, Ruleset};

mod webhooks;
use webhooks::build_rocket;

#[derive(Parser)]
#[command(version)]
struct Opts {
    /// Configuration file for specwatch
    #[arg(short, long, env = "SPECWATCH_CONFIG")]
    config: PathBuf,

    /// GitHub token, overrides the one from the configuration file
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();
    let config = SpecwatchConfig::from_file(&opts.config)?.with_token_override(opts.github_token);

    let ruleset =
        Ruleset::with_overrides(&config.lint.rules).context("invalid lint configuration")?;
    let api = GitHubClient::new(&config).context("failed to create GitHub client")?;
    let pipeline = Pipeline::new(
        &config,
        Arc::new(api),
        Arc::new(OpenApiLinter::new(ruleset)),
    );

    info!(
        "checking `{}` in pull requests of {}/{}",
        config.target_file, config.repository.owner, config.repository.name
    );

    let rocket = build_rocket(pipeline, config.github_secret.clone());
    rocket
        .launch()
        .await
        .map(|_| ())
        .map_err(|err| anyhow::anyhow!("rocket failed: {}", err))
}
