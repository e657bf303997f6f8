use std::{collections::HashMap, fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use url::Url;

use crate::validation::Severity;

#[derive(Debug, Clone, Deserialize)]
pub struct SpecwatchConfig {
    /// Token used to authenticate against the GitHub REST API. The `GITHUB_TOKEN` environment
    /// variable takes precedence over this value.
    #[serde(default)]
    pub github_token: Option<String>,
    /// Secret shared with GitHub to sign webhook payloads. Signatures aren't checked when unset.
    #[serde(default)]
    pub github_secret: Option<String>,
    /// Repository whose pull requests are checked and receive commit statuses.
    pub repository: RepositoryConfig,
    /// Base URL of the GitHub REST API, override it for GitHub Enterprise.
    #[serde(default = "default_api_url")]
    pub github_api_url: Url,
    /// Name of the OpenAPI document to look for in pull requests.
    #[serde(default = "default_target_file")]
    pub target_file: String,
    #[serde(default)]
    pub file_match: FileMatch,
    /// Context label attached to every commit status.
    #[serde(default = "default_status_context")]
    pub status_context: String,
    /// Timeout applied to every outbound request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How many times a failed GET request to GitHub is retried.
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub lint: LintConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
}

/// How changed files are compared against [`SpecwatchConfig::target_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMatch {
    /// Only a file at exactly this path matches.
    #[default]
    ExactPath,
    /// Any file whose last path component matches, whatever its directory.
    BaseName,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LintConfig {
    /// Per-rule severity overrides on top of the baseline ruleset.
    #[serde(default)]
    pub rules: HashMap<String, Severity>,
}

fn default_api_url() -> Url {
    Url::parse("https://api.github.com").expect("hardcoded URL is valid")
}

fn default_target_file() -> String {
    "openapi.json".to_owned()
}

fn default_status_context() -> String {
    "openapi-validation".to_owned()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl SpecwatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let config_file =
            File::open(path).with_context(|| format!("couldn't open {}:", path.display()))?;
        serde_yaml::from_reader(BufReader::new(config_file)).context("couldn't parse config file")
    }

    /// Replaces the configured token with `token` when one was given, e.g. from the environment.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.github_token = Some(token);
        }
        self
    }

    pub fn github_token(&self) -> anyhow::Result<&str> {
        self.github_token
            .as_deref()
            .ok_or_else(|| anyhow!("no GitHub token configured, set GITHUB_TOKEN or github_token"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Configuration pointing at `api_url`, used by tests talking to a mock GitHub.
#[cfg(test)]
pub(crate) fn test_config(api_url: &str) -> SpecwatchConfig {
    SpecwatchConfig {
        github_token: Some("test-token".to_owned()),
        github_secret: None,
        repository: RepositoryConfig {
            owner: "prologin".to_owned(),
            name: "api".to_owned(),
        },
        github_api_url: Url::parse(api_url).expect("test URL should be valid"),
        target_file: default_target_file(),
        file_match: FileMatch::ExactPath,
        status_context: default_status_context(),
        timeout_secs: 5,
        retries: 0,
        retry_backoff_ms: 0,
        lint: LintConfig::default(),
    }
}
