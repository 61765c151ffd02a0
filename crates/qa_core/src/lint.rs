use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::span::Span;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A single lint finding about one test-case document.
///
/// Findings are advisory data: a caller decides whether any of them blocks
/// persistence. Every finding is independently reportable to the end user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LintFinding {
    pub rule_id: String,
    pub severity: Severity,
    /// Corpus-relative path (or `-` for stdin drafts) for deterministic output.
    pub path: String,
    pub span: Span,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
}

impl LintFinding {
    pub fn new(rule_id: &str, severity: Severity, path: &str, message: String) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            path: path.to_string(),
            span: Span::file(path),
            message,
            evidence: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.span.line = Some(line);
        self
    }

    pub fn with_evidence(mut self, evidence: Value) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Count findings per severity: `(errors, warnings)`.
pub fn count_by_severity(findings: &[LintFinding]) -> (u64, u64) {
    let errors = findings.iter().filter(|f| f.severity == Severity::Error).count() as u64;
    let warnings = findings
        .iter()
        .filter(|f| f.severity == Severity::Warning)
        .count() as u64;
    (errors, warnings)
}
