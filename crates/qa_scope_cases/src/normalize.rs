//! Front-matter lint and normalization.
//!
//! [`lint`] is one generic loop over the schema table: required keys must be
//! present, closed domains must contain the value, kinds must match, and
//! optional keys with a default are filled in. Findings are advisory; only a
//! structurally malformed document prevents normalization.

use std::fmt;

use qa_core::{is_placeholder, CaseId, LintFinding, Severity};
use serde_json::{json, Map, Value};

use crate::frontmatter::{parse, serialize, value_type_name, MalformedDocument, Metadata};
use crate::schema_registry::{AllowedValues, FieldKind, SchemaEntry, SchemaRegistry};

pub const RULE_MALFORMED_DOCUMENT: &str = "case-schema/malformed-document";
pub const RULE_MISSING_REQUIRED_KEY: &str = "case-schema/missing-required-key";
pub const RULE_INVALID_VALUE: &str = "case-schema/invalid-value";
pub const RULE_MALFORMED_ID: &str = "case-schema/malformed-id";
pub const RULE_TYPE_MISMATCH: &str = "case-schema/type-mismatch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintError {
    Malformed(MalformedDocument),
    MissingRequiredKey {
        key: String,
    },
    InvalidValue {
        key: String,
        value: String,
        allowed: Vec<String>,
    },
    MalformedId {
        value: String,
        reason: String,
        /// Unassigned placeholder such as `APP1-TC-XXX`.
        placeholder: bool,
    },
    TypeMismatch {
        key: String,
        expected: FieldKind,
        found: &'static str,
    },
}

impl LintError {
    pub fn rule_id(&self) -> &'static str {
        match self {
            LintError::Malformed(_) => RULE_MALFORMED_DOCUMENT,
            LintError::MissingRequiredKey { .. } => RULE_MISSING_REQUIRED_KEY,
            LintError::InvalidValue { .. } => RULE_INVALID_VALUE,
            LintError::MalformedId { .. } => RULE_MALFORMED_ID,
            LintError::TypeMismatch { .. } => RULE_TYPE_MISMATCH,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            LintError::MalformedId {
                placeholder: true, ..
            } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Metadata key the finding is about, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            LintError::Malformed(_) => None,
            LintError::MalformedId { .. } => Some("id"),
            LintError::MissingRequiredKey { key }
            | LintError::InvalidValue { key, .. }
            | LintError::TypeMismatch { key, .. } => Some(key),
        }
    }

    pub fn to_finding(&self, path: &str) -> LintFinding {
        let finding = LintFinding::new(self.rule_id(), self.severity(), path, self.to_string());
        match self {
            LintError::InvalidValue { key, value, allowed } => finding.with_evidence(json!({
                "key": key,
                "value": value,
                "allowed": allowed,
            })),
            LintError::Malformed(_) => finding,
            _ => match self.key() {
                Some(key) => finding.with_evidence(json!({ "key": key })),
                None => finding,
            },
        }
    }
}

impl fmt::Display for LintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintError::Malformed(err) => write!(f, "malformed document: {err}"),
            LintError::MissingRequiredKey { key } => {
                write!(f, "required key `{key}` missing in front matter")
            }
            LintError::InvalidValue {
                key,
                value,
                allowed,
            } => write!(
                f,
                "key `{key}` value `{value}` not in allowed values: {{{}}}",
                allowed.join(",")
            ),
            LintError::MalformedId { value, reason, .. } => {
                write!(f, "id `{value}` is malformed: {reason}")
            }
            LintError::TypeMismatch {
                key,
                expected,
                found,
            } => write!(
                f,
                "key `{key}` should be a {}, got {found}",
                expected.as_str()
            ),
        }
    }
}

/// Outcome of linting one raw document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintResult {
    pub errors: Vec<LintError>,
    /// Best-effort canonical text; `None` only for malformed documents.
    pub normalized_document: Option<String>,
}

impl LintResult {
    fn fatal(err: MalformedDocument) -> Self {
        Self {
            errors: vec![LintError::Malformed(err)],
            normalized_document: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_malformed(&self) -> bool {
        self.normalized_document.is_none()
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity() == Severity::Error)
    }

    pub fn findings(&self, path: &str) -> Vec<LintFinding> {
        self.errors.iter().map(|e| e.to_finding(path)).collect()
    }
}

/// Lint and normalize a raw document against the built-in schema.
pub fn lint(raw: &str) -> LintResult {
    lint_with_registry(raw, SchemaRegistry::builtin())
}

pub fn lint_with_registry(raw: &str, registry: &SchemaRegistry) -> LintResult {
    let mut doc = match parse(raw) {
        Ok(doc) => doc,
        Err(err) => return LintResult::fatal(err),
    };

    let errors = normalize_metadata(&mut doc.metadata, registry);

    match serialize(&doc.metadata, &doc.body) {
        Ok(text) => LintResult {
            errors,
            normalized_document: Some(text),
        },
        Err(err) => LintResult::fatal(err),
    }
}

/// Validate `metadata` in place: report violations and fill defaults.
///
/// Keys unknown to the registry are passed through without validation.
pub fn normalize_metadata(metadata: &mut Metadata, registry: &SchemaRegistry) -> Vec<LintError> {
    let mut errors = Vec::new();

    for entry in registry.entries() {
        match get_path(metadata, entry).filter(|v| !v.is_null()) {
            Some(value) => check_value(entry, value, registry, &mut errors),
            None if entry.required => errors.push(LintError::MissingRequiredKey {
                key: entry.key.clone(),
            }),
            None => {
                if let Some(default) = &entry.default {
                    insert_path(metadata, entry, default.clone());
                }
            }
        }
    }

    if let Some(err) = check_id(metadata) {
        errors.push(err);
    }
    errors
}

fn check_value(
    entry: &SchemaEntry,
    value: &Value,
    registry: &SchemaRegistry,
    errors: &mut Vec<LintError>,
) {
    if !entry.kind.accepts(value) {
        errors.push(LintError::TypeMismatch {
            key: entry.key.clone(),
            expected: entry.kind,
            found: value_type_name(value),
        });
        return;
    }
    if let AllowedValues::OneOf(allowed) = registry.allowed_values(&entry.key) {
        let rendered = scalar_text(value);
        if !allowed.iter().any(|a| *a == rendered) {
            errors.push(LintError::InvalidValue {
                key: entry.key.clone(),
                value: rendered,
                allowed: allowed.to_vec(),
            });
        }
    }
}

fn check_id(metadata: &Metadata) -> Option<LintError> {
    let value = metadata.get("id").filter(|v| !v.is_null())?;
    let Some(text) = value.as_str() else {
        return Some(LintError::MalformedId {
            value: scalar_text(value),
            reason: format!("expected a string, got {}", value_type_name(value)),
            placeholder: false,
        });
    };
    let parsed = match metadata.get("app").and_then(Value::as_str) {
        Some(app) => CaseId::parse_for_app(text, app),
        None => CaseId::parse(text),
    };
    parsed.err().map(|err| LintError::MalformedId {
        value: text.to_string(),
        reason: err.to_string(),
        placeholder: is_placeholder(text),
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn get_path<'a>(metadata: &'a Metadata, entry: &SchemaEntry) -> Option<&'a Value> {
    let mut segments = entry.path();
    let mut current = metadata.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Insert `value` at the entry's path. Missing intermediate mappings are
/// created; a non-mapping parent leaves the metadata unchanged.
fn insert_path(metadata: &mut Metadata, entry: &SchemaEntry, value: Value) {
    let segments: Vec<&str> = entry.path().collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let Some((first, middle)) = parents.split_first() else {
        metadata.insert(last.to_string(), value);
        return;
    };

    let slot = metadata
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    let mut current = slot;
    for segment in middle {
        let Some(obj) = current.as_object_mut() else {
            return;
        };
        current = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(obj) = current.as_object_mut() {
        obj.insert(last.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::parse;

    const VALID: &str = "---\nid: APP1-TC-001\napp: APP1\narea: Login\nsuite: Regression\ntype: Functional\npriority: P2\nstatus: Draft\nstory_refs: []\nbug_refs: []\nowner: \"@qa\"\nautomation:\n  status: Planned\n  mapping: \"\"\nlinks: []\n---\n# Login\n";

    fn metadata_of(result: &LintResult) -> Metadata {
        parse(result.normalized_document.as_deref().unwrap())
            .unwrap()
            .metadata
    }

    #[test]
    fn valid_document_is_clean_and_stable() {
        let result = lint(VALID);
        assert!(result.is_clean(), "unexpected errors: {:?}", result.errors);
        let normalized = result.normalized_document.unwrap();
        assert_eq!(lint(&normalized).normalized_document.unwrap(), normalized);
    }

    #[test]
    fn fills_optional_defaults_without_errors() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: \"@qa\"\n---\nBody\n";
        let result = lint(input);
        assert!(result.is_clean(), "unexpected errors: {:?}", result.errors);
        let meta = metadata_of(&result);
        assert_eq!(meta["type"], json!("Functional"));
        assert_eq!(meta["status"], json!("Draft"));
        assert_eq!(meta["story_refs"], json!([]));
        assert_eq!(meta["bug_refs"], json!([]));
        assert_eq!(meta["links"], json!([]));
        assert_eq!(meta["automation"], json!({"status": "Planned", "mapping": ""}));
        assert!(!meta.contains_key("id"), "lint must never allocate an id");
        assert!(result.normalized_document.unwrap().ends_with("---\nBody\n"));
    }

    #[test]
    fn missing_owner_reported_with_usable_document() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\n---\n";
        let result = lint(input);
        assert_eq!(
            result.errors,
            vec![LintError::MissingRequiredKey {
                key: "owner".into()
            }]
        );
        let meta = metadata_of(&result);
        assert_eq!(meta["status"], json!("Draft"));
        assert!(result.findings("-")[0].message.contains("owner"));
    }

    #[test]
    fn null_required_value_counts_as_missing() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner:\n---\n";
        let result = lint(input);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].key(), Some("owner"));
    }

    #[test]
    fn priority_outside_domain() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P9\nowner: me\n---\n";
        let result = lint(input);
        assert_eq!(
            result.errors,
            vec![LintError::InvalidValue {
                key: "priority".into(),
                value: "P9".into(),
                allowed: vec!["P0".into(), "P1".into(), "P2".into(), "P3".into()],
            }]
        );
        assert_eq!(
            result.errors[0].to_string(),
            "key `priority` value `P9` not in allowed values: {P0,P1,P2,P3}"
        );
        assert!(result.normalized_document.is_some());
    }

    #[test]
    fn nested_enum_checked() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\nautomation:\n  status: Someday\n---\n";
        let result = lint(input);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].key(), Some("automation.status"));
        let meta = metadata_of(&result);
        assert_eq!(meta["automation"]["status"], json!("Someday"));
        assert_eq!(meta["automation"]["mapping"], json!(""));
    }

    #[test]
    fn list_field_type_mismatch_passes_value_through() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\nstory_refs: JIRA-1\n---\n";
        let result = lint(input);
        assert_eq!(
            result.errors,
            vec![LintError::TypeMismatch {
                key: "story_refs".into(),
                expected: FieldKind::List,
                found: "string",
            }]
        );
        assert_eq!(metadata_of(&result)["story_refs"], json!("JIRA-1"));
    }

    #[test]
    fn non_mapping_automation_is_not_defaulted_into() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\nautomation: yes please\n---\n";
        let result = lint(input);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].rule_id(), RULE_TYPE_MISMATCH);
        assert_eq!(metadata_of(&result)["automation"], json!("yes please"));
    }

    #[test]
    fn malformed_document_is_single_fatal_error() {
        let result = lint("---\napp: APP1\npriority: P1\n# never closed\n");
        assert_eq!(
            result.errors,
            vec![LintError::Malformed(
                MalformedDocument::MissingClosingDelimiter
            )]
        );
        assert!(result.normalized_document.is_none());
        assert!(result.is_malformed());
    }

    #[test]
    fn id_must_match_app_and_padding() {
        let base = "app: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\n";
        for bad in ["APP2-TC-001", "APP1-TC-1", "APP1-TC-000", "APP1-001"] {
            let result = lint(&format!("---\nid: {bad}\n{base}---\n"));
            assert_eq!(result.errors.len(), 1, "{bad}: {:?}", result.errors);
            assert_eq!(result.errors[0].rule_id(), RULE_MALFORMED_ID);
            assert_eq!(result.errors[0].severity(), Severity::Error);
        }
        let ok = lint(&format!("---\nid: APP1-TC-1000\n{base}---\n"));
        assert!(ok.is_clean(), "{:?}", ok.errors);
    }

    #[test]
    fn placeholder_id_is_a_warning() {
        let input = "---\nid: APP1-TC-XXX\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\n---\n";
        let result = lint(input);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].severity(), Severity::Warning);
        assert!(!result.has_errors());
    }

    #[test]
    fn numeric_id_is_malformed() {
        let input = "---\nid: 12\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\n---\n";
        let result = lint(input);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(&result.errors[0], LintError::MalformedId { value, .. } if value == "12"));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\ncomponent: checkout\n---\n";
        let result = lint(input);
        assert!(result.is_clean());
        assert_eq!(metadata_of(&result)["component"], json!("checkout"));
    }

    #[test]
    fn errors_accumulate_in_table_order() {
        let input = "---\npriority: P7\nstatus: Done\n---\n";
        let result = lint(input);
        let rules: Vec<(&str, Option<&str>)> = result
            .errors
            .iter()
            .map(|e| (e.rule_id(), e.key()))
            .collect();
        assert_eq!(
            rules,
            vec![
                (RULE_MISSING_REQUIRED_KEY, Some("app")),
                (RULE_MISSING_REQUIRED_KEY, Some("area")),
                (RULE_MISSING_REQUIRED_KEY, Some("suite")),
                (RULE_INVALID_VALUE, Some("priority")),
                (RULE_INVALID_VALUE, Some("status")),
                (RULE_MISSING_REQUIRED_KEY, Some("owner")),
            ]
        );
    }

    #[test]
    fn extension_registry_defaults_apply() {
        let reg = SchemaRegistry::with_extension_toml(
            "registry_version = 1\n[[fields]]\nkey = \"component\"\ndefault = \"web\"\nkind = \"string\"\n",
        )
        .unwrap();
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P1\nowner: me\n---\n";
        let result = lint_with_registry(input, &reg);
        assert!(result.is_clean());
        assert_eq!(metadata_of(&result)["component"], json!("web"));
    }

    #[test]
    fn findings_carry_rule_and_evidence() {
        let input = "---\napp: APP1\narea: Login\nsuite: Smoke\npriority: P9\nowner: me\n---\n";
        let findings = lint(input).findings("drafts/new.md");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, RULE_INVALID_VALUE);
        assert_eq!(findings[0].path, "drafts/new.md");
        assert_eq!(findings[0].evidence.as_ref().unwrap()["value"], json!("P9"));
    }
}
