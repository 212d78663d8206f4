//! Request scanning against the pattern registry.
//!
//! # Responsibilities
//! - Scan the URL path, query parameters and JSON body of a request
//! - Produce one finding per matched category and location
//! - Truncate offending values before they reach any log sink
//!
//! # Design Decisions
//! - Body descent uses an explicit work list with a depth cap; nesting is
//!   attacker-controlled and must not be able to exhaust the stack
//! - The first matching rule per category wins for a given value
//! - Non-string scalars (numbers, booleans, null) carry no scannable text

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::waf::patterns::{PatternRegistry, RuleCategory};

/// Longest value fragment carried in a finding.
///
/// Audit records must never contain full secrets or payloads.
const SNIPPET_MAX_CHARS: usize = 100;

/// Deepest body nesting the scanner will walk.
const MAX_BODY_DEPTH: usize = 50;

/// A single pattern match recorded during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFinding {
    /// Category of the matched rule.
    pub category: RuleCategory,
    /// Name of the rule that matched.
    pub rule: &'static str,
    /// Where the value was found: `path`, `query:<key>` or `body:<dotted.path>`.
    pub location: String,
    /// Offending value, truncated to [`SNIPPET_MAX_CHARS`] characters.
    pub snippet: String,
}

/// Aggregate allow/block decision for one request.
///
/// Created per request and consumed immediately by the decision gate;
/// an empty findings list means allow.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanVerdict {
    pub findings: Vec<ScanFinding>,
}

impl ScanVerdict {
    /// Non-empty findings block the request.
    pub fn is_blocked(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn extend(&mut self, findings: Vec<ScanFinding>) {
        self.findings.extend(findings);
    }
}

/// Applies the pattern registry to every string value found in a request.
#[derive(Debug, Clone)]
pub struct RequestScanner {
    registry: Arc<PatternRegistry>,
}

impl RequestScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }

    /// Scan the URL path. Only traversal and suspicious-file categories
    /// apply; SQL or script fragments in a path are noise, not signal.
    pub fn scan_path(&self, path: &str) -> Vec<ScanFinding> {
        self.scan_value(path, "path", RuleCategory::PATH)
    }

    /// Scan every string-valued query parameter against all categories.
    pub fn scan_query<'a, I>(&self, params: I) -> Vec<ScanFinding>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut findings = Vec::new();
        for (key, value) in params {
            findings.extend(self.scan_value(value, &format!("query:{key}"), RuleCategory::ALL));
        }
        findings
    }

    /// Walk a JSON body and scan every string value against all categories.
    ///
    /// Iterative descent: nodes deeper than [`MAX_BODY_DEPTH`] are skipped.
    pub fn scan_body(&self, body: &Value) -> Vec<ScanFinding> {
        let mut findings = Vec::new();
        let mut work: Vec<(&Value, String, usize)> = vec![(body, String::new(), 0)];

        while let Some((node, path, depth)) = work.pop() {
            match node {
                Value::String(s) => {
                    findings.extend(self.scan_value(s, &body_location(&path), RuleCategory::ALL));
                }
                Value::Array(items) => {
                    if depth >= MAX_BODY_DEPTH {
                        tracing::debug!(
                            location = %body_location(&path),
                            "Body nesting exceeds scan depth, skipping subtree"
                        );
                        continue;
                    }
                    for (index, item) in items.iter().enumerate() {
                        work.push((item, join_path(&path, &index.to_string()), depth + 1));
                    }
                }
                Value::Object(map) => {
                    if depth >= MAX_BODY_DEPTH {
                        tracing::debug!(
                            location = %body_location(&path),
                            "Body nesting exceeds scan depth, skipping subtree"
                        );
                        continue;
                    }
                    for (key, value) in map {
                        work.push((value, join_path(&path, key), depth + 1));
                    }
                }
                Value::Null | Value::Bool(_) | Value::Number(_) => {}
            }
        }
        findings
    }

    fn scan_value(
        &self,
        value: &str,
        location: &str,
        categories: &[RuleCategory],
    ) -> Vec<ScanFinding> {
        let mut findings = Vec::new();
        for &category in categories {
            for rule in self.registry.category(category) {
                if rule.is_match(value) {
                    findings.push(ScanFinding {
                        category,
                        rule: rule.name,
                        location: location.to_string(),
                        snippet: truncate_snippet(value),
                    });
                    break;
                }
            }
        }
        findings
    }
}

fn body_location(path: &str) -> String {
    if path.is_empty() {
        "body".to_string()
    } else {
        format!("body:{path}")
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}.{segment}")
    }
}

/// Truncate on a character boundary so multi-byte values cannot split.
fn truncate_snippet(value: &str) -> String {
    match value.char_indices().nth(SNIPPET_MAX_CHARS) {
        Some((index, _)) => value[..index].to_string(),
        None => value.to_string(),
    }
}
