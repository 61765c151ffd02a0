//! Lint, allocate and publish a draft as one all-or-nothing step.

use qa_core::{CaseId, LintFinding, Severity};
use qa_scope_cases::{ensure_front_matter, lint_with_registry, parse, LintError, SchemaRegistry};
use serde_json::Value;

use crate::allocator::{AllocError, AllocationPolicy, Allocator};
use crate::corpus::CorpusStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct PersistRequest<'a> {
    pub markdown: &'a str,
    /// Overrides the document's `app` when set.
    pub app: Option<&'a str>,
    /// Overrides the document's `area` when set.
    pub area: Option<&'a str>,
    pub preferred_id: Option<&'a str>,
    /// Refuse drafts that still carry error-severity findings.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub id: CaseId,
    pub rel_path: String,
    pub attempts: u32,
    /// Advisory findings on the document as persisted.
    pub errors: Vec<LintError>,
}

impl PersistOutcome {
    pub fn findings(&self) -> Vec<LintFinding> {
        self.errors
            .iter()
            .map(|e| e.to_finding(&self.rel_path))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("draft is malformed: {0}")]
    Malformed(String),
    #[error("draft has no `{0}`; pass it explicitly or set it in the front matter")]
    MissingField(&'static str),
    #[error("draft rejected with {} error finding(s): {}", .0.len(), summarize(.0))]
    Rejected(Vec<LintError>),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

impl PersistError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistError::Alloc(err) if err.is_retryable())
    }
}

fn summarize(errors: &[LintError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Persist a draft under a freshly allocated (or preferred) identifier.
///
/// The draft is normalized first; the stored text is its canonical form with
/// `id` set. A valid id already present in the draft is treated like
/// `preferred_id` and tried first.
pub fn persist_case<S>(
    store: &S,
    registry: &SchemaRegistry,
    policy: AllocationPolicy,
    request: PersistRequest<'_>,
) -> Result<PersistOutcome, PersistError>
where
    S: CorpusStore + ?Sized,
{
    let draft = ensure_front_matter(request.markdown);
    let linted = lint_with_registry(&draft, registry);
    let Some(normalized) = linted.normalized_document.as_deref() else {
        return Err(PersistError::Malformed(summarize(&linted.errors)));
    };
    let mut doc = parse(normalized).map_err(|e| PersistError::Malformed(e.to_string()))?;

    let app = resolve_field(&mut doc.metadata, "app", request.app)
        .ok_or(PersistError::MissingField("app"))?;
    let area = resolve_field(&mut doc.metadata, "area", request.area)
        .ok_or(PersistError::MissingField("area"))?;

    // Overrides may have fixed findings; judge the document being stored.
    let precheck = lint_with_registry(&doc.to_text().map_err(malformed)?, registry);
    if request.strict {
        let blocking: Vec<LintError> = precheck
            .errors
            .iter()
            .filter(|e| {
                e.severity() == Severity::Error && !matches!(e, LintError::MalformedId { .. })
            })
            .cloned()
            .collect();
        if !blocking.is_empty() {
            return Err(PersistError::Rejected(blocking));
        }
    }

    let preferred = request
        .preferred_id
        .or_else(|| doc.get_str("id"))
        .and_then(|text| CaseId::parse_for_app(text.trim(), &app).ok());

    let mut rendered = String::new();
    let allocator = Allocator::new(store, policy);
    let allocation = allocator.allocate_preferring(&app, &area, preferred.as_ref(), |id| {
        doc.metadata
            .insert("id".to_string(), Value::String(id.to_string()));
        let text = doc.to_text()?;
        rendered.clone_from(&text);
        Ok::<_, qa_scope_cases::MalformedDocument>(text)
    })?;

    let errors = lint_with_registry(&rendered, registry).errors;
    tracing::info!(
        id = %allocation.id,
        path = %allocation.rel_path,
        findings = errors.len(),
        "persisted test case"
    );
    Ok(PersistOutcome {
        id: allocation.id,
        rel_path: allocation.rel_path,
        attempts: allocation.attempts,
        errors,
    })
}

fn malformed(err: qa_scope_cases::MalformedDocument) -> PersistError {
    PersistError::Malformed(err.to_string())
}

/// Apply an override to `key`, then return the non-blank string value.
fn resolve_field(
    metadata: &mut qa_scope_cases::Metadata,
    key: &str,
    override_value: Option<&str>,
) -> Option<String> {
    if let Some(value) = override_value.map(str::trim).filter(|v| !v.is_empty()) {
        metadata.insert(key.to_string(), Value::String(value.to_string()));
    }
    metadata
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
