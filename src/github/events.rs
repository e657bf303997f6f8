use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The subset of a `pull_request` webhook payload we act on.
///
/// Everything is optional so that a payload missing a field can be answered with a meaningful
/// error instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default, deserialize_with = "deserialize_action")]
    pub action: PullRequestAction,
    pub pull_request: Option<PullRequest>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    #[default]
    Other,
}

impl PullRequestAction {
    /// Whether the head commit of the pull request may have changed.
    pub fn needs_check(self) -> bool {
        matches!(self, PullRequestAction::Opened | PullRequestAction::Synchronize)
    }
}

// anything but the two actions we check, whatever its JSON type, is just another action
fn deserialize_action<'de, D>(deserializer: D) -> Result<PullRequestAction, D::Error>
where
    D: Deserializer<'de>,
{
    let action = Option::<Value>::deserialize(deserializer)?;
    Ok(match action.as_ref().and_then(Value::as_str) {
        Some("opened") => PullRequestAction::Opened,
        Some("synchronize") => PullRequestAction::Synchronize,
        _ => PullRequestAction::Other,
    })
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub number: Option<u64>,
    pub head: Option<PrHead>,
}

#[derive(Debug, Deserialize)]
pub struct PrHead {
    pub sha: Option<String>,
}

impl WebhookEvent {
    pub fn number(&self) -> Option<u64> {
        self.pull_request.as_ref().and_then(|pr| pr.number)
    }

    pub fn head_sha(&self) -> Option<&str> {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.head.as_ref())
            .and_then(|head| head.sha.as_deref())
            .filter(|sha| !sha.is_empty())
    }
}

/// Whether `sha` is a full SHA-1 or SHA-256 commit id in hex.
pub fn is_commit_sha(sha: &str) -> bool {
    matches!(sha.len(), 40 | 64) && sha.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    #[rstest]
    #[case(r#"{"action": "opened"}"#, PullRequestAction::Opened)]
    #[case(r#"{"action": "synchronize"}"#, PullRequestAction::Synchronize)]
    #[case(r#"{"action": "closed"}"#, PullRequestAction::Other)]
    #[case(r#"{"action": "review_requested"}"#, PullRequestAction::Other)]
    #[case(r#"{"action": 3}"#, PullRequestAction::Other)]
    #[case(r#"{"action": null}"#, PullRequestAction::Other)]
    #[case(r#"{"action": {"name": "opened"}}"#, PullRequestAction::Other)]
    #[case(r#"{}"#, PullRequestAction::Other)]
    fn action_is_parsed(#[case] payload: &str, #[case] expected: PullRequestAction) {
        let event: WebhookEvent = serde_json::from_str(payload).expect("payload should parse");
        assert_eq!(event.action, expected);
    }

    #[test]
    fn full_payload_exposes_number_and_sha() {
        let payload = format!(
            r#"{{
                "action": "synchronize",
                "number": 42,
                "pull_request": {{
                    "number": 42,
                    "title": "Add pets endpoint",
                    "head": {{ "ref": "pets", "sha": "{}" }}
                }},
                "repository": {{ "full_name": "prologin/api" }}
            }}"#,
            SHA
        );
        let event: WebhookEvent = serde_json::from_str(&payload).expect("payload should parse");

        assert!(event.action.needs_check());
        assert_eq!(event.number(), Some(42));
        assert_eq!(event.head_sha(), Some(SHA));
    }

    #[test]
    fn missing_fields_are_none() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"action": "opened", "pull_request": {"head": {"sha": ""}}}"#)
                .expect("payload should parse");
        assert_eq!(event.number(), None);
        assert_eq!(event.head_sha(), None);
    }

    #[rstest]
    #[case(SHA, true)]
    #[case("0123456789ABCDEF0123456789ABCDEF01234567", true)]
    #[case(&"ab".repeat(32), true)]
    #[case("abc123", false)]
    #[case("../../../../orgs/evil/hooks", false)]
    #[case("0123456789abcdef0123456789abcdef0123456g", false)]
    #[case("0123456789abcdef0123456789abcdef01234567/", false)]
    fn commit_sha_shape(#[case] sha: &str, #[case] expected: bool) {
        assert_eq!(is_commit_sha(sha), expected);
    }
}
