use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Value shape a front-matter field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    List,
    Mapping,
    Any,
}

impl FieldKind {
    fn any() -> Self {
        FieldKind::Any
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::List => "list",
            FieldKind::Mapping => "mapping",
            FieldKind::Any => "any",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::List => value.is_array(),
            FieldKind::Mapping => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

/// One declarative row of the schema table.
///
/// Dotted keys (`automation.status`) address members of a nested mapping.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaEntry {
    pub key: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default = "FieldKind::any")]
    pub kind: FieldKind,
}

impl SchemaEntry {
    fn required(key: &str, kind: FieldKind) -> Self {
        Self {
            key: key.to_string(),
            required: true,
            allowed_values: None,
            default: None,
            kind,
        }
    }

    fn optional(key: &str, kind: FieldKind, default: Option<Value>) -> Self {
        Self {
            key: key.to_string(),
            required: false,
            allowed_values: None,
            default,
            kind,
        }
    }

    fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Key path segments (`["automation", "status"]`).
    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.key.split('.')
    }

    pub fn parent_key(&self) -> Option<&str> {
        self.key.rsplit_once('.').map(|(parent, _)| parent)
    }
}

/// Allowed value domain of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedValues<'a> {
    Unrestricted,
    OneOf(&'a [String]),
}

impl AllowedValues<'_> {
    pub fn permits(&self, value: &str) -> bool {
        match self {
            AllowedValues::Unrestricted => true,
            AllowedValues::OneOf(values) => values.iter().any(|v| v == value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("parse schema extension: {0}")]
    Parse(String),
    #[error("unsupported schema registry_version {0} (expected 1)")]
    UnsupportedVersion(u32),
    #[error("schema key `{0}` is already defined; extensions are additive only")]
    DuplicateKey(String),
    #[error("schema key `{key}` needs parent `{parent}` declared as a mapping")]
    OrphanChild { key: String, parent: String },
    #[error("default for `{0}` is not one of its allowed values")]
    DefaultNotAllowed(String),
    #[error("schema key is empty or has an empty path segment: `{0}`")]
    InvalidKey(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaExtension {
    registry_version: u32,
    #[serde(default)]
    fields: Vec<SchemaEntry>,
}

/// Front-matter schema: key -> constraints, in declaration order.
///
/// Read-only after construction. Parents are always declared before their
/// dotted children so default filling can proceed in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRegistry {
    entries: Vec<SchemaEntry>,
}

static BUILTIN: OnceLock<SchemaRegistry> = OnceLock::new();

impl SchemaRegistry {
    /// The built-in test-case schema, shared process-wide.
    pub fn builtin() -> &'static SchemaRegistry {
        BUILTIN.get_or_init(|| SchemaRegistry {
            entries: builtin_entries(),
        })
    }

    /// Built-in schema plus additional fields from a TOML extension:
    ///
    /// ```toml
    /// registry_version = 1
    ///
    /// [[fields]]
    /// key = "component"
    /// allowed_values = ["web", "api"]
    /// default = "web"
    /// kind = "string"
    /// ```
    pub fn with_extension_toml(content: &str) -> Result<Self, SchemaError> {
        let ext: SchemaExtension =
            toml::from_str(content).map_err(|e| SchemaError::Parse(e.to_string()))?;
        if ext.registry_version != 1 {
            return Err(SchemaError::UnsupportedVersion(ext.registry_version));
        }
        let mut registry = Self::builtin().clone();
        for entry in ext.fields {
            registry.push_extension(entry)?;
        }
        Ok(registry)
    }

    fn push_extension(&mut self, entry: SchemaEntry) -> Result<(), SchemaError> {
        if entry.key.is_empty() || entry.path().any(str::is_empty) {
            return Err(SchemaError::InvalidKey(entry.key));
        }
        if self.lookup(&entry.key).is_some() {
            return Err(SchemaError::DuplicateKey(entry.key));
        }
        if let Some(parent) = entry.parent_key() {
            let parent_is_mapping = self
                .lookup(parent)
                .is_some_and(|p| p.kind == FieldKind::Mapping);
            if !parent_is_mapping {
                return Err(SchemaError::OrphanChild {
                    parent: parent.to_string(),
                    key: entry.key,
                });
            }
        }
        if let (Some(allowed), Some(Value::String(default))) =
            (&entry.allowed_values, &entry.default)
        {
            if !allowed.iter().any(|v| v == default) {
                return Err(SchemaError::DefaultNotAllowed(entry.key));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn lookup(&self, key: &str) -> Option<&SchemaEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn required_keys(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .filter(|e| e.required)
            .map(|e| e.key.as_str())
            .collect()
    }

    pub fn allowed_values(&self, key: &str) -> AllowedValues<'_> {
        match self.lookup(key).and_then(|e| e.allowed_values.as_deref()) {
            Some(values) => AllowedValues::OneOf(values),
            None => AllowedValues::Unrestricted,
        }
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }
}

fn builtin_entries() -> Vec<SchemaEntry> {
    vec![
        // Shape checked against the identifier pattern, not by kind.
        SchemaEntry::optional("id", FieldKind::Any, None),
        SchemaEntry::required("app", FieldKind::String),
        SchemaEntry::required("area", FieldKind::String),
        SchemaEntry::required("suite", FieldKind::String),
        SchemaEntry::optional("type", FieldKind::String, Some(json!("Functional"))),
        SchemaEntry::required("priority", FieldKind::String).one_of(&["P0", "P1", "P2", "P3"]),
        SchemaEntry::optional("status", FieldKind::String, Some(json!("Draft")))
            .one_of(&["Draft", "Ready"]),
        SchemaEntry::optional("story_refs", FieldKind::List, Some(json!([]))),
        SchemaEntry::optional("bug_refs", FieldKind::List, Some(json!([]))),
        SchemaEntry::required("owner", FieldKind::String),
        SchemaEntry::optional("automation", FieldKind::Mapping, Some(json!({}))),
        SchemaEntry::optional("automation.status", FieldKind::String, Some(json!("Planned")))
            .one_of(&["Planned", "Automated", "NotApplicable"]),
        SchemaEntry::optional("automation.mapping", FieldKind::String, Some(json!(""))),
        SchemaEntry::optional("links", FieldKind::List, Some(json!([]))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_required_keys() {
        let reg = SchemaRegistry::builtin();
        let required: Vec<_> = reg.required_keys().into_iter().collect();
        assert_eq!(required, vec!["app", "area", "owner", "priority", "suite"]);
    }

    #[test]
    fn builtin_priority_domain() {
        let reg = SchemaRegistry::builtin();
        match reg.allowed_values("priority") {
            AllowedValues::OneOf(values) => assert_eq!(values, &["P0", "P1", "P2", "P3"]),
            other => panic!("expected OneOf, got {other:?}"),
        }
        assert_eq!(reg.allowed_values("owner"), AllowedValues::Unrestricted);
        assert_eq!(reg.allowed_values("not-a-key"), AllowedValues::Unrestricted);
    }

    #[test]
    fn builtin_parents_precede_children() {
        let reg = SchemaRegistry::builtin();
        for (idx, entry) in reg.entries().iter().enumerate() {
            if let Some(parent) = entry.parent_key() {
                let parent_idx = reg
                    .entries()
                    .iter()
                    .position(|e| e.key == parent)
                    .expect("parent declared");
                assert!(parent_idx < idx, "{} declared before parent", entry.key);
            }
        }
    }

    #[test]
    fn builtin_is_shared() {
        assert!(std::ptr::eq(SchemaRegistry::builtin(), SchemaRegistry::builtin()));
    }

    #[test]
    fn extension_adds_fields() {
        let reg = SchemaRegistry::with_extension_toml(
            r#"
registry_version = 1

[[fields]]
key = "component"
allowed_values = ["web", "api"]
default = "web"
kind = "string"

[[fields]]
key = "automation.framework"
default = "playwright"
"#,
        )
        .unwrap();
        let component = reg.lookup("component").unwrap();
        assert!(!component.required);
        assert_eq!(component.default, Some(json!("web")));
        assert!(reg.allowed_values("component").permits("api"));
        assert!(!reg.allowed_values("component").permits("cli"));
        assert_eq!(reg.lookup("automation.framework").unwrap().kind, FieldKind::Any);
        // Built-in table untouched.
        assert!(SchemaRegistry::builtin().lookup("component").is_none());
    }

    #[test]
    fn extension_cannot_redefine_builtin() {
        let err = SchemaRegistry::with_extension_toml(
            "registry_version = 1\n[[fields]]\nkey = \"priority\"\n",
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateKey("priority".into()));
    }

    #[test]
    fn extension_child_needs_mapping_parent() {
        let err = SchemaRegistry::with_extension_toml(
            "registry_version = 1\n[[fields]]\nkey = \"owner.team\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::OrphanChild { .. }));
    }

    #[test]
    fn extension_default_must_be_allowed() {
        let err = SchemaRegistry::with_extension_toml(
            "registry_version = 1\n[[fields]]\nkey = \"tier\"\nallowed_values = [\"a\"]\ndefault = \"b\"\n",
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::DefaultNotAllowed("tier".into()));
    }

    #[test]
    fn extension_version_checked() {
        let err = SchemaRegistry::with_extension_toml("registry_version = 2\n").unwrap_err();
        assert_eq!(err, SchemaError::UnsupportedVersion(2));
    }
}
