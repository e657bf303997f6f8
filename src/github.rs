mod client;
pub use client::GitHubClient;

mod events;
pub use events::{is_commit_sha, WebhookEvent};

mod types;
pub use types::{CommitState, CommitStatus, FileStatus, PullRequestFile};

/// The parts of the GitHub REST API needed to check a pull request.
#[rocket::async_trait]
pub trait GitHubApi: Send + Sync {
    /// Lists every file changed in pull request `number`.
    async fn pull_request_files(&self, number: u64) -> anyhow::Result<Vec<PullRequestFile>>;

    /// Downloads the raw content of a file, from its `raw_url`.
    async fn raw_content(&self, raw_url: &str) -> anyhow::Result<String>;

    /// Attaches `status` to commit `sha`.
    async fn create_commit_status(&self, sha: &str, status: &CommitStatus) -> anyhow::Result<()>;
}
