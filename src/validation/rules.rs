use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
};

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::validation::Linter;

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warn,
    Off,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warn => "warn",
            Severity::Off => "off",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    SpecVersion,
    InfoRequired,
    PathsRequired,
    OperationDescription,
    OperationIdUnique,
    PathParametersDefined,
    NoPathTrailingSlash,
    Operation2xxResponse,
}

impl Rule {
    pub const ALL: [Rule; 8] = [
        Rule::SpecVersion,
        Rule::InfoRequired,
        Rule::PathsRequired,
        Rule::OperationDescription,
        Rule::OperationIdUnique,
        Rule::PathParametersDefined,
        Rule::NoPathTrailingSlash,
        Rule::Operation2xxResponse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Rule::SpecVersion => "spec-version",
            Rule::InfoRequired => "info-required",
            Rule::PathsRequired => "paths-required",
            Rule::OperationDescription => "operation-description",
            Rule::OperationIdUnique => "operation-operationId-unique",
            Rule::PathParametersDefined => "path-parameters-defined",
            Rule::NoPathTrailingSlash => "no-path-trailing-slash",
            Rule::Operation2xxResponse => "operation-2xx-response",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|rule| rule.name() == name)
    }

    fn baseline_severity(self) -> Severity {
        match self {
            Rule::NoPathTrailingSlash | Rule::Operation2xxResponse => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

/// Severity of every known rule.
#[derive(Debug, Clone)]
pub struct Ruleset {
    severities: HashMap<Rule, Severity>,
}

impl Ruleset {
    /// The fixed baseline. Operation descriptions are mandatory.
    pub fn baseline() -> Self {
        Self {
            severities: Rule::ALL
                .iter()
                .map(|&rule| (rule, rule.baseline_severity()))
                .collect(),
        }
    }

    /// The baseline, with the severity of some rules replaced. Unknown rule names are rejected.
    pub fn with_overrides(overrides: &HashMap<String, Severity>) -> anyhow::Result<Self> {
        let mut ruleset = Self::baseline();
        for (name, &severity) in overrides {
            let rule =
                Rule::from_name(name).ok_or_else(|| anyhow!("unknown lint rule `{}`", name))?;
            ruleset.severities.insert(rule, severity);
        }
        Ok(ruleset)
    }

    pub fn severity(&self, rule: Rule) -> Severity {
        self.severities
            .get(&rule)
            .copied()
            .unwrap_or_else(|| rule.baseline_severity())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule: Rule,
    pub severity: Severity,
    pub message: String,
    /// JSON pointer to the offending node, e.g. `#/paths/~1pets/get`.
    pub location: String,
}

impl Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.severity,
            self.rule.name(),
            self.message,
            self.location
        )
    }
}

/// Built-in linter for OpenAPI 3.x and Swagger 2.0 documents, in JSON or YAML.
pub struct OpenApiLinter {
    ruleset: Ruleset,
}

impl OpenApiLinter {
    pub fn new(ruleset: Ruleset) -> Self {
        Self { ruleset }
    }
}

impl Linter for OpenApiLinter {
    fn lint(&self, content: &str) -> anyhow::Result<Vec<Finding>> {
        let document = parse_document(content)?;
        let root = match document.as_object() {
            Some(root) => root,
            None => bail!("document root must be an object"),
        };

        let mut report = Report {
            ruleset: &self.ruleset,
            findings: Vec::new(),
        };

        check_version(root, &mut report);
        check_info(root, &mut report);

        let paths = match root.get("paths").and_then(Value::as_object) {
            Some(paths) => paths,
            None => {
                report.push(Rule::PathsRequired, "#/paths", "`paths` object is missing");
                return Ok(report.findings);
            }
        };

        for path in paths.keys() {
            if path.len() > 1 && path.ends_with('/') {
                report.push(
                    Rule::NoPathTrailingSlash,
                    pointer(&["paths", path]),
                    format!("path `{}` ends with a slash", path),
                );
            }
        }

        let operations = operations(paths);
        let mut operation_ids: HashSet<&str> = HashSet::new();
        for operation in &operations {
            check_operation(&document, operation, &mut operation_ids, &mut report);
        }

        Ok(report.findings)
    }
}

fn parse_document(content: &str) -> anyhow::Result<Value> {
    // JSON first: YAML rejects tab indentation that's valid in JSON
    match serde_json::from_str(content) {
        Ok(document) => Ok(document),
        Err(_) => serde_yaml::from_str(content)
            .context("couldn't parse document as JSON or YAML"),
    }
}

struct Report<'a> {
    ruleset: &'a Ruleset,
    findings: Vec<Finding>,
}

impl Report<'_> {
    fn push(&mut self, rule: Rule, location: impl Into<String>, message: impl Into<String>) {
        let severity = self.ruleset.severity(rule);
        if severity == Severity::Off {
            return;
        }
        self.findings.push(Finding {
            rule,
            severity,
            message: message.into(),
            location: location.into(),
        });
    }
}

struct Operation<'a> {
    path: &'a str,
    method: &'a str,
    path_item: &'a Map<String, Value>,
    body: &'a Map<String, Value>,
}

impl Operation<'_> {
    fn location(&self) -> String {
        pointer(&["paths", self.path, self.method])
    }
}

fn operations(paths: &Map<String, Value>) -> Vec<Operation<'_>> {
    let mut operations = Vec::new();
    for (path, item) in paths {
        let path_item = match item.as_object() {
            Some(item) => item,
            None => continue,
        };
        for method in HTTP_METHODS {
            if let Some(body) = path_item.get(method).and_then(Value::as_object) {
                operations.push(Operation {
                    path,
                    method,
                    path_item,
                    body,
                });
            }
        }
    }
    operations
}

fn check_version(root: &Map<String, Value>, report: &mut Report) {
    let openapi = root.get("openapi").and_then(Value::as_str);
    let swagger = root.get("swagger").and_then(Value::as_str);
    let supported = matches!(openapi, Some(v) if v.starts_with("3.")) || swagger == Some("2.0");
    if !supported {
        report.push(
            Rule::SpecVersion,
            "#/openapi",
            "document must declare `openapi: 3.x` or `swagger: \"2.0\"`",
        );
    }
}

fn check_info(root: &Map<String, Value>, report: &mut Report) {
    let info = match root.get("info").and_then(Value::as_object) {
        Some(info) => info,
        None => {
            report.push(Rule::InfoRequired, "#/info", "`info` object is missing");
            return;
        }
    };
    for field in ["title", "version"] {
        if info.get(field).and_then(Value::as_str).is_none() {
            report.push(
                Rule::InfoRequired,
                pointer(&["info", field]),
                format!("`info.{}` is missing", field),
            );
        }
    }
}

fn check_operation<'a>(
    document: &Value,
    operation: &Operation<'a>,
    operation_ids: &mut HashSet<&'a str>,
    report: &mut Report,
) {
    let location = operation.location();
    let name = format!("{} {}", operation.method.to_uppercase(), operation.path);

    let described = operation
        .body
        .get("description")
        .and_then(Value::as_str)
        .map_or(false, |d| !d.trim().is_empty());
    if !described {
        report.push(
            Rule::OperationDescription,
            format!("{}/description", location),
            format!("operation `{}` has no description", name),
        );
    }

    if let Some(id) = operation.body.get("operationId").and_then(Value::as_str) {
        if !operation_ids.insert(id) {
            report.push(
                Rule::OperationIdUnique,
                format!("{}/operationId", location),
                format!("operationId `{}` is used more than once", id),
            );
        }
    }

    let declared = declared_path_parameters(document, operation);
    for parameter in template_parameters(operation.path) {
        if !declared.contains(parameter) {
            report.push(
                Rule::PathParametersDefined,
                format!("{}/parameters", location),
                format!(
                    "path parameter `{}` of `{}` isn't declared",
                    parameter, name
                ),
            );
        }
    }

    let has_success = operation
        .body
        .get("responses")
        .and_then(Value::as_object)
        .map_or(false, |responses| {
            responses
                .keys()
                .any(|code| code.starts_with('2') || code == "default")
        });
    if !has_success {
        report.push(
            Rule::Operation2xxResponse,
            format!("{}/responses", location),
            format!("operation `{}` has no 2XX response", name),
        );
    }
}

/// Names between braces in a templated path, e.g. `id` in `/pets/{id}`.
fn template_parameters(path: &str) -> Vec<&str> {
    let mut parameters = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                parameters.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    parameters
}

fn declared_path_parameters<'a>(
    document: &'a Value,
    operation: &Operation<'a>,
) -> HashSet<&'a str> {
    [operation.path_item, operation.body]
        .into_iter()
        .filter_map(|node| node.get("parameters").and_then(Value::as_array))
        .flatten()
        .filter_map(|parameter| resolve(document, parameter).as_object())
        .filter(|parameter| parameter.get("in").and_then(Value::as_str) == Some("path"))
        .filter_map(|parameter| parameter.get("name").and_then(Value::as_str))
        .collect()
}

/// Follows a local `$ref`, returns the node itself when it isn't one or can't be resolved.
fn resolve<'a>(document: &'a Value, node: &'a Value) -> &'a Value {
    node.get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix('#'))
        .and_then(|p| document.pointer(p))
        .unwrap_or(node)
}

fn pointer(segments: &[&str]) -> String {
    let mut pointer = String::from("#");
    for segment in segments {
        pointer.push('/');
        pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    }
    pointer
}
