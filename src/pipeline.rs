use std::sync::Arc;

use rocket::http::Status;
use tracing::{debug, info, trace, warn};

use crate::{
    config::{FileMatch, SpecwatchConfig},
    github::{
        is_commit_sha, CommitState, CommitStatus, FileStatus, GitHubApi, PullRequestFile,
        WebhookEvent,
    },
    utils::shorten_content,
    validation::{validate, Linter, ValidationOutcome},
};

pub const IGNORED_MESSAGE: &str = "Ignoring event";
pub const PROCESSING_ERROR_MESSAGE: &str = "Error processing the webhook";
const INVALID_PAYLOAD_MESSAGE: &str = "Invalid webhook payload";
const PULL_REQUEST_EVENT: &str = "pull_request";
// GitHub rejects longer commit status descriptions
const DESCRIPTION_LIMIT: usize = 140;

/// Status code and plain-text body sent back to the webhook caller.
pub type Reply = (Status, String);

/// Checks the OpenAPI document of pull requests and reports the result as a commit status.
pub struct Pipeline {
    api: Arc<dyn GitHubApi>,
    linter: Arc<dyn Linter>,
    target_file: String,
    file_match: FileMatch,
    status_context: String,
}

impl Pipeline {
    pub fn new(config: &SpecwatchConfig, api: Arc<dyn GitHubApi>, linter: Arc<dyn Linter>) -> Self {
        Self {
            api,
            linter,
            target_file: config.target_file.clone(),
            file_match: config.file_match,
            status_context: config.status_context.clone(),
        }
    }

    /// Handles one webhook delivery.
    ///
    /// `event_type` is the value of the `X-GitHub-Event` header, if the caller sent one.
    pub async fn handle_event(&self, event_type: Option<&str>, payload: &str) -> Reply {
        if let Some(event_type) = event_type {
            if event_type != PULL_REQUEST_EVENT {
                debug!("ignoring `{}` event", event_type);
                return (Status::Ok, IGNORED_MESSAGE.to_owned());
            }
        }

        let event: WebhookEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                info!("couldn't parse webhook payload: {}", e);
                return (Status::BadRequest, INVALID_PAYLOAD_MESSAGE.to_owned());
            }
        };

        if !event.action.needs_check() {
            debug!("ignoring pull request action {:?}", event.action);
            return (Status::Ok, IGNORED_MESSAGE.to_owned());
        }

        // answered without a commit status, there is no head commit to attach it to
        let number = match event.number() {
            Some(number) => number,
            None => return (Status::BadRequest, "Missing pull request number".to_owned()),
        };
        let sha = match event.head_sha() {
            Some(sha) => sha,
            None => return (Status::BadRequest, "Missing head commit SHA".to_owned()),
        };
        if !is_commit_sha(sha) {
            info!("rejecting PR #{} with malformed head SHA {:?}", number, sha);
            return (Status::BadRequest, "Invalid head commit SHA".to_owned());
        }

        info!("checking PR #{} at {}", number, sha);
        match self.inspect(number).await {
            Ok(outcome) => {
                info!(
                    "PR #{}: {} ({} finding(s))",
                    number,
                    outcome.state,
                    outcome.findings.len()
                );
                self.report_status(sha, outcome.state, &outcome.message)
                    .await;
                (Status::Ok, outcome.message)
            }
            Err(e) => {
                warn!("error while checking PR #{}: {:#}", number, e);
                self.report_status(sha, CommitState::Error, PROCESSING_ERROR_MESSAGE)
                    .await;
                (
                    Status::InternalServerError,
                    PROCESSING_ERROR_MESSAGE.to_owned(),
                )
            }
        }
    }

    /// Finds the target file in the pull request and validates it. Only network failures are
    /// returned as errors, validation problems are part of the outcome.
    async fn inspect(&self, number: u64) -> anyhow::Result<ValidationOutcome> {
        let files = self.api.pull_request_files(number).await?;

        let file = match find_target(&files, &self.target_file, self.file_match) {
            Some(file) => file,
            None => {
                return Ok(success(format!("No {} file found.", self.target_file)));
            }
        };

        if file.status == FileStatus::Removed {
            return Ok(success(format!("{} removed.", self.target_file)));
        }

        trace!("fetching {} from {}", file.filename, file.raw_url);
        let content = self.api.raw_content(&file.raw_url).await?;
        Ok(validate(self.linter.as_ref(), &content))
    }

    /// Sends a commit status. Failures are only logged, they never change the reply.
    async fn report_status(&self, sha: &str, state: CommitState, description: &str) {
        let status = CommitStatus {
            state,
            description: shorten_content(description, DESCRIPTION_LIMIT),
            context: self.status_context.clone(),
        };

        match self.api.create_commit_status(sha, &status).await {
            Ok(()) => debug!("reported {} on {}", state, sha),
            Err(e) => warn!("couldn't report commit status on {}: {:#}", sha, e),
        }
    }
}

fn success(message: String) -> ValidationOutcome {
    ValidationOutcome {
        state: CommitState::Success,
        message,
        findings: Vec::new(),
    }
}

/// Looks for `target` among `files`. The first match in listing order wins.
pub fn find_target<'a>(
    files: &'a [PullRequestFile],
    target: &str,
    file_match: FileMatch,
) -> Option<&'a PullRequestFile> {
    files.iter().find(|file| match file_match {
        FileMatch::ExactPath => file.filename == target,
        FileMatch::BaseName => {
            file.filename == target
                || file
                    .filename
                    .rsplit_once('/')
                    .map_or(false, |(_, name)| name == target)
        }
    })
}
