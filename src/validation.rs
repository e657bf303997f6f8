use tracing::{debug, warn};

use crate::github::CommitState;

mod rules;
pub use rules::{Finding, OpenApiLinter, Rule, Ruleset, Severity};

const VALID_MESSAGE: &str = "OpenAPI specification is valid.";
const LINT_ERROR_MESSAGE: &str = "Failed to lint the OpenAPI specification.";

/// Something able to check the content of an OpenAPI document.
pub trait Linter: Send + Sync {
    /// Returns every finding for `content`, or an error when the document couldn't be linted at
    /// all.
    fn lint(&self, content: &str) -> anyhow::Result<Vec<Finding>>;
}

#[derive(Debug)]
pub struct ValidationOutcome {
    pub state: CommitState,
    pub message: String,
    pub findings: Vec<Finding>,
}

/// Runs `linter` on `content` and turns the result into the state reported to GitHub.
///
/// This never fails: a linter error becomes an [`CommitState::Error`] outcome.
pub fn validate(linter: &dyn Linter, content: &str) -> ValidationOutcome {
    let findings = match linter.lint(content) {
        Ok(findings) => findings,
        Err(e) => {
            warn!("linter failed: {:#}", e);
            return ValidationOutcome {
                state: CommitState::Error,
                message: LINT_ERROR_MESSAGE.to_owned(),
                findings: Vec::new(),
            };
        }
    };

    for finding in &findings {
        debug!("{}", finding);
    }

    let errors = count(&findings, Severity::Error);
    let warnings = count(&findings, Severity::Warn);

    if errors == 0 && warnings == 0 {
        ValidationOutcome {
            state: CommitState::Success,
            message: VALID_MESSAGE.to_owned(),
            findings,
        }
    } else {
        ValidationOutcome {
            state: CommitState::Failure,
            message: format!(
                "OpenAPI validation failed: {} error(s), {} warning(s).",
                errors, warnings
            ),
            findings,
        }
    }
}

fn count(findings: &[Finding], severity: Severity) -> usize {
    findings.iter().filter(|f| f.severity == severity).count()
}
