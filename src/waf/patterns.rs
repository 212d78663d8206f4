//! Detection pattern registry.
//!
//! # Responsibilities
//! - Define the built-in detection rules for each category
//! - Compile rules once at startup into an immutable registry
//! - Expose, per category, an ordered list of matchers
//!
//! # Design Decisions
//! - Registry is immutable after construction; shared via Arc across requests
//! - A rule whose pattern fails to compile is skipped, never fatal
//! - Matching is case-insensitive except literal traversal sequences

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Category of a detection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// SQL injection attacks.
    SqlInjection,
    /// Cross-site scripting.
    Xss,
    /// Path traversal and sensitive file access.
    PathTraversal,
    /// OS command injection.
    CommandInjection,
    /// Requests for suspicious file names or extensions.
    SuspiciousFile,
}

impl RuleCategory {
    /// Stable tag carried in findings and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlInjection => "sql_injection",
            Self::Xss => "xss",
            Self::PathTraversal => "path_traversal",
            Self::CommandInjection => "command_injection",
            Self::SuspiciousFile => "suspicious_file",
        }
    }

    /// Categories applied to the URL path.
    pub const PATH: &'static [RuleCategory] = &[Self::PathTraversal, Self::SuspiciousFile];

    /// All categories, applied to query parameters and body values.
    pub const ALL: &'static [RuleCategory] = &[
        Self::SqlInjection,
        Self::Xss,
        Self::PathTraversal,
        Self::CommandInjection,
        Self::SuspiciousFile,
    ];
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compiled detection rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Rule identifier for audit records.
    pub name: &'static str,
    /// Category the rule belongs to.
    pub category: RuleCategory,
    matcher: Regex,
}

impl Rule {
    fn compile(
        name: &'static str,
        category: RuleCategory,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            category,
            matcher: Regex::new(pattern)?,
        })
    }

    /// Whether the rule matches the given value.
    pub fn is_match(&self, value: &str) -> bool {
        self.matcher.is_match(value)
    }
}

/// Built-in rule table: (name, category, pattern).
///
/// Patterns are `(?i)` case-insensitive unless the signature is a literal
/// byte sequence (plain `../` traversal, null bytes).
const BUILTIN_RULES: &[(&str, RuleCategory, &str)] = &[
    // SQL injection
    (
        "sqli-union-select",
        RuleCategory::SqlInjection,
        r"(?i)\bunion(\s+all)?\s+select\b",
    ),
    (
        "sqli-statement",
        RuleCategory::SqlInjection,
        r"(?i)\b(select\s+.+\s+from|insert\s+into|delete\s+from|drop\s+(table|database)|truncate\s+table|update\s+\w+\s+set)\b",
    ),
    (
        "sqli-tautology",
        RuleCategory::SqlInjection,
        r"(?i)'\s*(or|and)\s+[^=]{0,40}=",
    ),
    (
        "sqli-comment",
        RuleCategory::SqlInjection,
        r"(?i)(--\s*$|--\s|/\*|\*/|@@\w+|\bxp_\w+|\bsp_\w+|\bexec\s*\()",
    ),
    (
        "sqli-time-based",
        RuleCategory::SqlInjection,
        r"(?i)(\b(sleep|benchmark|pg_sleep)\s*\(|\bwaitfor\s+delay\b)",
    ),
    // Cross-site scripting
    (
        "xss-script-tag",
        RuleCategory::Xss,
        r"(?i)<\s*/?\s*script\b",
    ),
    (
        "xss-event-handler",
        RuleCategory::Xss,
        r"(?i)\bon(abort|blur|change|click|dblclick|error|focus|input|keydown|keypress|keyup|load|mousedown|mousemove|mouseout|mouseover|mouseup|submit|unload)\s*=",
    ),
    (
        "xss-js-uri",
        RuleCategory::Xss,
        r"(?i)(javascript|vbscript)\s*:",
    ),
    (
        "xss-embed-tag",
        RuleCategory::Xss,
        r"(?i)<\s*(iframe|object|embed)\b",
    ),
    (
        "xss-dom-sink",
        RuleCategory::Xss,
        r"(?i)(\b(eval|alert|prompt|confirm)\s*\(|document\s*\.\s*(cookie|write|location))",
    ),
    // Path traversal
    (
        "traversal-dotdot",
        RuleCategory::PathTraversal,
        r"\.\.(/|\\)",
    ),
    (
        "traversal-encoded",
        RuleCategory::PathTraversal,
        r"(?i)(%2e%2e(%2f|%5c|/|\\)|\.\.(%2f|%5c)|%c0%ae|%252e)",
    ),
    (
        "traversal-sensitive-file",
        RuleCategory::PathTraversal,
        r"(?i)(etc/(passwd|shadow|group|hosts)|boot\.ini|win\.ini|windows/system32|/proc/self)",
    ),
    (
        "traversal-null-byte",
        RuleCategory::PathTraversal,
        r"%00|\x00",
    ),
    // Command injection
    (
        "cmdi-chained-binary",
        RuleCategory::CommandInjection,
        r"(?i)[;&|]\s*(cat|ls|pwd|whoami|id|rm|mv|cp|chmod|chown|wget|curl|nc|netcat|bash|sh|zsh|cmd|powershell|ping|nslookup)\b",
    ),
    (
        "cmdi-substitution",
        RuleCategory::CommandInjection,
        r"\$\([^)]*\)",
    ),
    (
        "cmdi-backtick",
        RuleCategory::CommandInjection,
        r"`[^`]+`",
    ),
    (
        "cmdi-fetch-exec",
        RuleCategory::CommandInjection,
        r"(?i)\b(wget|curl)\s+(-\S+\s+)*https?://",
    ),
    (
        "cmdi-shell-path",
        RuleCategory::CommandInjection,
        r"(?i)(/bin/(ba|z|da)?sh|/usr/bin/(perl|python\d?|ruby))\b",
    ),
    // Suspicious files
    (
        "file-executable-ext",
        RuleCategory::SuspiciousFile,
        r"(?i)\.(exe|dll|bat|cmd|com|scr|msi)\b",
    ),
    (
        "file-script-ext",
        RuleCategory::SuspiciousFile,
        r"(?i)\.(php\d?|asp|aspx|jsp|jspx|cgi)\b",
    ),
    (
        "file-config-ext",
        RuleCategory::SuspiciousFile,
        r"(?i)\.(env|ini|bak|backup|old|swp)$",
    ),
    (
        "file-hidden-dotfile",
        RuleCategory::SuspiciousFile,
        r"(?i)/\.(git|svn|htaccess|htpasswd|env|ssh|aws)\b",
    ),
];

/// Immutable set of compiled rules, grouped by category.
///
/// Built once at startup and shared via `Arc`; request handling never
/// mutates it, so scanning the same input always yields the same findings.
#[derive(Debug)]
pub struct PatternRegistry {
    rules: HashMap<RuleCategory, Vec<Rule>>,
}

impl PatternRegistry {
    /// Compile the built-in rule table.
    ///
    /// A rule that fails to compile is logged and skipped so one bad
    /// pattern cannot take the whole gate down.
    pub fn builtin() -> Self {
        let mut rules: HashMap<RuleCategory, Vec<Rule>> = HashMap::new();
        for (name, category, pattern) in BUILTIN_RULES {
            match Rule::compile(name, *category, pattern) {
                Ok(rule) => rules.entry(*category).or_default().push(rule),
                Err(e) => {
                    tracing::error!(rule = name, error = %e, "Skipping rule with invalid pattern")
                }
            }
        }
        Self { rules }
    }

    /// Ordered matchers for one category.
    pub fn category(&self, category: RuleCategory) -> &[Rule] {
        self.rules
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Check if the registry compiled to nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
