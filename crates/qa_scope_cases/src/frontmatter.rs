use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

use qa_core::CaseId;

/// Front-matter metadata, keyed by field name.
pub type Metadata = BTreeMap<String, Value>;

/// Canonical top-level key order of a serialized front-matter block.
///
/// Part of the on-disk contract: version-control diffs depend on it, so it
/// must never be reordered. Keys not listed here follow in ascending order.
pub const CANONICAL_KEY_ORDER: &[&str] = &[
    "id",
    "app",
    "area",
    "suite",
    "type",
    "priority",
    "status",
    "story_refs",
    "bug_refs",
    "owner",
    "automation",
    "links",
];

/// Canonical member order inside the `automation` mapping.
pub const CANONICAL_AUTOMATION_ORDER: &[&str] = &["status", "mapping"];

const DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedDocument {
    #[error("document does not start with a `---` front-matter delimiter")]
    MissingOpeningDelimiter,
    #[error("front matter opened on line 1 is never closed by a `---` line")]
    MissingClosingDelimiter,
    #[error("front matter is not valid YAML: {0}")]
    InvalidYaml(String),
    #[error("front matter must be a key/value mapping, found {0}")]
    NotAMapping(&'static str),
    #[error("front matter could not be serialized: {0}")]
    Unserializable(String),
}

/// Markdown body following the front-matter block, passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body(String);

/// One ATX-heading delimited section of a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// `None` for text preceding the first heading.
    pub heading: Option<String>,
    pub level: u8,
    pub content: String,
}

impl Body {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into sections at ATX headings, ignoring headings in code fences.
    pub fn sections(&self) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut current = Section {
            heading: None,
            level: 0,
            content: String::new(),
        };
        let mut in_fence = false;

        for line in self.0.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            let heading = if in_fence { None } else { atx_heading(line) };
            match heading {
                Some((level, text)) => {
                    if current.heading.is_some() || !current.content.trim().is_empty() {
                        sections.push(current);
                    }
                    current = Section {
                        heading: Some(text.to_string()),
                        level,
                        content: String::new(),
                    };
                }
                None => {
                    current.content.push_str(line);
                    current.content.push('\n');
                }
            }
        }
        if current.heading.is_some() || !current.content.trim().is_empty() {
            sections.push(current);
        }
        sections
    }

    /// Text of the first level-1 heading.
    pub fn title(&self) -> Option<String> {
        self.sections()
            .into_iter()
            .find(|s| s.level == 1)
            .and_then(|s| s.heading)
    }
}

fn atx_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((hashes as u8, rest.trim()))
}

/// A test-case document split into metadata and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCaseDocument {
    pub metadata: Metadata,
    pub body: Body,
}

impl TestCaseDocument {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn to_text(&self) -> Result<String, MalformedDocument> {
        serialize(&self.metadata, &self.body)
    }
}

/// Split raw Markdown into front-matter metadata and body.
///
/// The first line (after an optional BOM) must be `---`; the block ends at
/// the next line that is exactly `---` (trailing whitespace and CR allowed).
/// Everything after the closing line is the body, untouched.
pub fn parse(raw: &str) -> Result<TestCaseDocument, MalformedDocument> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let (first, mut rest) = split_line(text);
    if first.trim_end() != DELIMITER {
        return Err(MalformedDocument::MissingOpeningDelimiter);
    }

    let mut yaml_lines: Vec<&str> = Vec::new();
    loop {
        if rest.is_empty() {
            return Err(MalformedDocument::MissingClosingDelimiter);
        }
        let (line, remainder) = split_line(rest);
        rest = remainder;
        if line.trim_end() == DELIMITER {
            break;
        }
        yaml_lines.push(line.strip_suffix('\r').unwrap_or(line));
    }

    let metadata = parse_yaml_to_json_map(&yaml_lines.join("\n"))?;
    Ok(TestCaseDocument {
        metadata,
        body: Body::new(rest),
    })
}

/// Returns `(line, remainder)`; the line excludes its `\n`.
fn split_line(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(idx) => (&text[..idx], &text[idx + 1..]),
        None => (text, ""),
    }
}

/// Parse a YAML string into a JSON-compatible BTreeMap.
///
/// Uses serde_yaml to parse, then converts to serde_json::Value
/// for uniform downstream handling.
fn parse_yaml_to_json_map(yaml: &str) -> Result<Metadata, MalformedDocument> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| MalformedDocument::InvalidYaml(e.to_string()))?;
    let json_value: Value = serde_json::to_value(yaml_value)
        .map_err(|e| MalformedDocument::InvalidYaml(e.to_string()))?;

    match json_value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(Metadata::new()),
        other => Err(MalformedDocument::NotAMapping(value_type_name(&other))),
    }
}

/// Render metadata and body as canonical front-matter Markdown.
///
/// Keys are emitted in [`CANONICAL_KEY_ORDER`], so serializing the same
/// logical content always yields byte-identical text.
pub fn serialize(metadata: &Metadata, body: &Body) -> Result<String, MalformedDocument> {
    let mut mapping = serde_yaml::Mapping::new();
    for key in ordered_keys(metadata.keys().map(String::as_str), CANONICAL_KEY_ORDER) {
        if let Some(value) = metadata.get(key) {
            mapping.insert(serde_yaml::Value::String(key.to_string()), to_yaml(key, value));
        }
    }
    let yaml = serde_yaml::to_string(&mapping)
        .map_err(|e| MalformedDocument::Unserializable(e.to_string()))?;

    let mut out = String::with_capacity(yaml.len() + body.as_str().len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body.as_str());
    Ok(out)
}

fn ordered_keys<'a>(keys: impl Iterator<Item = &'a str>, order: &[&str]) -> Vec<&'a str> {
    let mut keys: Vec<&str> = keys.collect();
    keys.sort_by_key(|key| {
        let rank = order.iter().position(|k| k == key).unwrap_or(order.len());
        (rank, *key)
    });
    keys
}

fn nested_order(path: &str) -> &'static [&'static str] {
    match path {
        "automation" => CANONICAL_AUTOMATION_ORDER,
        _ => &[],
    }
}

fn to_yaml(path: &str, value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Number(n) => {
            let number = if let Some(i) = n.as_i64() {
                serde_yaml::Number::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_yaml::Number::from(u)
            } else {
                serde_yaml::Number::from(n.as_f64().unwrap_or(f64::NAN))
            };
            serde_yaml::Value::Number(number)
        }
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(items) => {
            serde_yaml::Value::Sequence(items.iter().map(|item| to_yaml(path, item)).collect())
        }
        Value::Object(obj) => {
            let mut mapping = serde_yaml::Mapping::new();
            for key in ordered_keys(obj.keys().map(String::as_str), nested_order(path)) {
                if let Some(child) = obj.get(key) {
                    let child_path = format!("{path}.{key}");
                    mapping.insert(
                        serde_yaml::Value::String(key.to_string()),
                        to_yaml(&child_path, child),
                    );
                }
            }
            serde_yaml::Value::Mapping(mapping)
        }
    }
}

/// Promote a leading fenced YAML block to front matter.
///
/// Text generators often wrap the metadata in ```` ```yaml ```` instead of
/// `---` delimiters. Documents that already open with `---`, or that have no
/// leading fence, are returned unchanged.
pub fn ensure_front_matter(raw: &str) -> Cow<'_, str> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    if split_line(text).0.trim_end() == DELIMITER {
        return Cow::Borrowed(raw);
    }

    let trimmed = text.trim_start();
    let (opening, mut rest) = split_line(trimmed);
    if !matches!(opening.trim_end(), "```" | "```yaml" | "```yml") {
        return Cow::Borrowed(raw);
    }

    let mut yaml_lines: Vec<&str> = Vec::new();
    loop {
        if rest.is_empty() {
            return Cow::Borrowed(raw);
        }
        let (line, remainder) = split_line(rest);
        rest = remainder;
        if line.trim_end() == "```" {
            break;
        }
        yaml_lines.push(line.strip_suffix('\r').unwrap_or(line));
    }

    let yaml = yaml_lines.join("\n");
    Cow::Owned(format!(
        "{DELIMITER}\n{}\n{DELIMITER}\n\n{}",
        yaml.trim(),
        rest.trim_start()
    ))
}

/// Write `id` into the document's metadata and re-serialize canonically.
pub fn set_id(raw: &str, id: &CaseId) -> Result<String, MalformedDocument> {
    let mut doc = parse(raw)?;
    doc.metadata
        .insert("id".to_string(), Value::String(id.to_string()));
    doc.to_text()
}

pub fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
