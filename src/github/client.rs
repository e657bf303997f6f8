use std::time::Duration;

use anyhow::{anyhow, Context};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Response,
};
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    config::SpecwatchConfig,
    github::{CommitStatus, GitHubApi, PullRequestFile},
};

const PER_PAGE: usize = 100;
// GitHub stops listing pull request files after 3000 entries
const MAX_PAGES: usize = 30;
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("specwatch/", env!("CARGO_PKG_VERSION"));

/// [`GitHubApi`] implementation talking to the GitHub REST API over HTTPS.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    owner: String,
    repo: String,
    retries: u32,
    retry_backoff: Duration,
}

impl GitHubClient {
    /// Builds a client for the repository named in `config`, authenticated with its token.
    pub fn new(config: &SpecwatchConfig) -> anyhow::Result<Self> {
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.github_token()?))
            .context("GitHub token isn't a valid header value")?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, authorization);
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .context("couldn't build HTTP client")?;

        Ok(Self {
            http,
            api_url: config.github_api_url.clone(),
            owner: config.repository.owner.clone(),
            repo: config.repository.name.clone(),
            retries: config.retries,
            retry_backoff: config.retry_backoff(),
        })
    }

    /// URL of a repository endpoint. Each of `segments` stays a single path segment, slashes and
    /// dots included.
    fn repo_url(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("{} can't be used as a base URL", self.api_url))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    /// Sends a GET request, retrying transient failures as configured.
    async fn get(&self, url: &Url, query: &[(&str, String)]) -> anyhow::Result<Response> {
        let mut attempt = 0;
        loop {
            trace!("GET {} {:?} (attempt {})", url, query, attempt + 1);
            let result = self
                .http
                .get(url.clone())
                .query(query)
                .send()
                .await
                .and_then(Response::error_for_status);

            match result {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.retries && is_transient(&e) => {
                    attempt += 1;
                    warn!("GET {} failed, retrying: {}", url, e);
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e).with_context(|| format!("GET {} failed", url)),
            }
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.status().map_or(false, |s| s.is_server_error())
}

#[rocket::async_trait]
impl GitHubApi for GitHubClient {
    async fn pull_request_files(&self, number: u64) -> anyhow::Result<Vec<PullRequestFile>> {
        let url = self.repo_url(&["pulls", &number.to_string(), "files"])?;
        let mut files = Vec::new();

        for page in 1..=MAX_PAGES {
            let query = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            let batch: Vec<PullRequestFile> = self
                .get(&url, &query)
                .await?
                .json()
                .await
                .with_context(|| format!("couldn't decode files of PR #{}", number))?;

            let last_page = batch.len() < PER_PAGE;
            files.extend(batch);
            if last_page {
                break;
            }
        }

        debug!("PR #{} changes {} file(s)", number, files.len());
        Ok(files)
    }

    async fn raw_content(&self, raw_url: &str) -> anyhow::Result<String> {
        let url = Url::parse(raw_url).with_context(|| format!("invalid raw URL {}", raw_url))?;
        self.get(&url, &[])
            .await?
            .text()
            .await
            .with_context(|| format!("couldn't read body of {}", raw_url))
    }

    async fn create_commit_status(&self, sha: &str, status: &CommitStatus) -> anyhow::Result<()> {
        let url = self.repo_url(&["statuses", sha])?;
        trace!("POST {} {:?}", url, status);

        self.http
            .post(url.clone())
            .json(status)
            .send()
            .await
            .and_then(Response::error_for_status)
            .with_context(|| format!("POST {} failed", url))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        config::test_config,
        github::{CommitState, FileStatus},
    };

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&test_config(&server.uri())).expect("client should build")
    }

    fn file_entries(count: usize) -> serde_json::Value {
        (0..count)
            .map(|i| {
                json!({
                    "sha": "0000",
                    "filename": format!("src/file{}.rs", i),
                    "status": "modified",
                    "raw_url": format!("https://example.com/raw/{}", i),
                    "additions": 1,
                    "deletions": 0,
                    "changes": 1
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn lists_files_with_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/prologin/api/pulls/7/files"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "1"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("x-github-api-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "filename": "openapi.json",
                    "status": "added",
                    "raw_url": "https://example.com/raw/openapi.json"
                },
                {
                    "filename": "old.txt",
                    "status": "removed",
                    "raw_url": "https://example.com/raw/old.txt"
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server)
            .pull_request_files(7)
            .await
            .expect("listing should succeed");

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename, "openapi.json");
        assert_eq!(files[0].status, FileStatus::Added);
        assert_eq!(files[1].status, FileStatus::Removed);
    }

    #[tokio::test]
    async fn follows_pages_until_a_short_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/prologin/api/pulls/7/files"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_entries(PER_PAGE)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/prologin/api/pulls/7/files"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_entries(3)))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server)
            .pull_request_files(7)
            .await
            .expect("listing should succeed");

        assert_eq!(files.len(), PER_PAGE + 3);
    }

    #[tokio::test]
    async fn server_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/prologin/api/pulls/7/files"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).pull_request_files(7).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw/openapi.json"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw/openapi.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.retries = 1;
        config.retry_backoff_ms = 1;
        let client = GitHubClient::new(&config).expect("client should build");

        let content = client
            .raw_content(&format!("{}/raw/openapi.json", server.uri()))
            .await
            .expect("second attempt should succeed");
        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw/openapi.json"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.retries = 3;
        config.retry_backoff_ms = 1;
        let client = GitHubClient::new(&config).expect("client should build");

        let result = client
            .raw_content(&format!("{}/raw/openapi.json", server.uri()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn creates_commit_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/repos/prologin/api/statuses/{}", SHA)))
            .and(body_json(json!({
                "state": "failure",
                "description": "OpenAPI validation failed: 1 error(s), 0 warning(s).",
                "context": "openapi-validation"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let status = CommitStatus {
            state: CommitState::Failure,
            description: "OpenAPI validation failed: 1 error(s), 0 warning(s).".to_owned(),
            context: "openapi-validation".to_owned(),
        };
        client(&server)
            .create_commit_status(SHA, &status)
            .await
            .expect("status should be created");
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/prologin/api/pulls/7/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(file_entries(1))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.timeout_secs = 1;
        let client = GitHubClient::new(&config).expect("client should build");

        let started = Instant::now();
        let result = client.pull_request_files(7).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn path_segments_are_not_split() {
        let client = GitHubClient::new(&test_config("http://localhost"))
            .expect("client should build");

        let url = client
            .repo_url(&["statuses", "../../../../orgs/evil/hooks"])
            .expect("URL should build");

        assert!(url.path().starts_with("/repos/prologin/api/statuses/"));
        assert_eq!(url.path_segments().map(Iterator::count), Some(5));
    }

    #[test]
    fn enterprise_base_path_is_kept() {
        let client = GitHubClient::new(&test_config("https://github.example.com/api/v3/"))
            .expect("client should build");

        let url = client
            .repo_url(&["pulls", "7", "files"])
            .expect("URL should build");

        assert_eq!(
            url.as_str(),
            "https://github.example.com/api/v3/repos/prologin/api/pulls/7/files"
        );
    }

    #[test]
    fn missing_token_is_rejected() {
        let mut config = test_config("http://localhost");
        config.github_token = None;
        assert!(GitHubClient::new(&config).is_err());
    }
}
