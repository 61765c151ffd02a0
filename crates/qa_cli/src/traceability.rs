//! Traceability matrix over the whole corpus.
//!
//! Writes `traceability.csv` (Excel-friendly: BOM, all fields quoted, CRLF),
//! `traceability.json`, `stats.json` and `warnings.txt` into one directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use qa_scope_cases::{parse, MalformedDocument, TestCaseDocument};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::corpus::{CorpusError, FsCorpus};

pub const CSV_FILE: &str = "traceability.csv";
pub const JSON_FILE: &str = "traceability.json";
pub const STATS_FILE: &str = "stats.json";
pub const WARNINGS_FILE: &str = "warnings.txt";

const CSV_COLUMNS: [&str; 13] = [
    "ID",
    "Title",
    "App",
    "Area",
    "Suite",
    "Type",
    "Priority",
    "Status",
    "Owner",
    "Stories",
    "Bugs",
    "Automation",
    "Path",
];

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encode {0}: {1}")]
    Encode(&'static str, serde_json::Error),
}

/// Story or bug reference, linked when it names a tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRef {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRow {
    pub id: String,
    pub title: String,
    pub app: String,
    pub area: String,
    pub suite: String,
    #[serde(rename = "type")]
    pub case_type: String,
    pub priority: String,
    pub status: String,
    pub owner: String,
    pub stories: Vec<IssueRef>,
    pub bugs: Vec<IssueRef>,
    pub automation: String,
    pub path: String,
}

impl TraceRow {
    fn csv_fields(&self) -> [String; 13] {
        [
            self.id.clone(),
            self.title.clone(),
            self.app.clone(),
            self.area.clone(),
            self.suite.clone(),
            self.case_type.clone(),
            self.priority.clone(),
            self.status.clone(),
            self.owner.clone(),
            join_refs(&self.stories),
            join_refs(&self.bugs),
            self.automation.clone(),
            self.path.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStats {
    pub by_app: BTreeMap<String, u64>,
    pub by_suite: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub total: u64,
    pub generated_at: String,
}

#[derive(Debug, Clone)]
pub struct TraceInput<'a> {
    pub corpus: &'a FsCorpus,
    pub out_dir: PathBuf,
    /// Issue tracker base URL, without trailing slash.
    pub server_url: Option<&'a str>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceOutput {
    pub files: u64,
    pub rows: u64,
    pub warnings: Vec<String>,
    pub csv_sha256: String,
    pub out_dir: PathBuf,
}

/// Read every case and write the matrix files.
pub fn build_traceability(input: TraceInput<'_>) -> Result<TraceOutput, TraceError> {
    let (rows, warnings, files) = collect_rows(input.corpus, input.server_url)?;
    fs::create_dir_all(&input.out_dir).map_err(|source| TraceError::Write {
        path: input.out_dir.clone(),
        source,
    })?;

    let csv = render_csv(&rows);
    write_file(&input.out_dir.join(CSV_FILE), csv.as_bytes())?;

    let json = serde_json::to_vec_pretty(&rows).map_err(|e| TraceError::Encode(JSON_FILE, e))?;
    write_file(&input.out_dir.join(JSON_FILE), &json)?;

    let stats = trace_stats(&rows, input.generated_at);
    let stats_json =
        serde_json::to_vec_pretty(&stats).map_err(|e| TraceError::Encode(STATS_FILE, e))?;
    write_file(&input.out_dir.join(STATS_FILE), &stats_json)?;

    write_file(
        &input.out_dir.join(WARNINGS_FILE),
        render_warnings(&warnings).as_bytes(),
    )?;

    for warning in &warnings {
        tracing::warn!(%warning, "traceability");
    }
    tracing::info!(rows = rows.len(), files, "built traceability matrix");

    Ok(TraceOutput {
        files,
        rows: rows.len() as u64,
        warnings,
        csv_sha256: sha256_hex(csv.as_bytes()),
        out_dir: input.out_dir,
    })
}

/// Rows sorted by `(app, id)`, plus warnings for documents that could not be
/// read or carry no usable front matter. Such documents still get a row keyed
/// by their file stem.
pub fn collect_rows(
    corpus: &FsCorpus,
    server_url: Option<&str>,
) -> Result<(Vec<TraceRow>, Vec<String>, u64), TraceError> {
    let entries = corpus.list_all()?;
    let mut rows = Vec::with_capacity(entries.len());
    let mut warnings = Vec::new();

    for entry in &entries {
        let content = match corpus.read(entry) {
            Ok(content) => content,
            Err(err) => {
                let reason = match &err {
                    CorpusError::Io { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                warnings.push(format!("Unreadable: {}: {reason}", entry.rel_path));
                rows.push(row_for(
                    &TestCaseDocument::default(),
                    &entry.stem,
                    &entry.rel_path,
                    server_url,
                ));
                continue;
            }
        };
        let doc = match parse(&content) {
            Ok(doc) => doc,
            Err(MalformedDocument::MissingOpeningDelimiter) => {
                warnings.push(format!("No front matter: {}", entry.rel_path));
                TestCaseDocument::default()
            }
            Err(err) => {
                warnings.push(format!("Front matter error in {}: {err}", entry.rel_path));
                TestCaseDocument::default()
            }
        };
        rows.push(row_for(&doc, &entry.stem, &entry.rel_path, server_url));
    }

    rows.sort_by(|a, b| (&a.app, &a.id).cmp(&(&b.app, &b.id)));
    Ok((rows, warnings, entries.len() as u64))
}

fn row_for(
    doc: &TestCaseDocument,
    stem: &str,
    rel_path: &str,
    server_url: Option<&str>,
) -> TraceRow {
    let field = |key: &str| doc.metadata.get(key).map(text_of).unwrap_or_default();
    let id = Some(field("id")).filter(|id| !id.is_empty());
    let automation = doc
        .metadata
        .get("automation")
        .and_then(|a| a.get("status"))
        .map(text_of)
        .unwrap_or_default();
    TraceRow {
        id: id.unwrap_or_else(|| stem.to_string()),
        title: doc.body.title().unwrap_or_else(|| stem.to_string()),
        app: field("app"),
        area: field("area"),
        suite: field("suite"),
        case_type: field("type"),
        priority: field("priority"),
        status: field("status"),
        owner: field("owner"),
        stories: issue_refs(doc.metadata.get("story_refs"), server_url),
        bugs: issue_refs(doc.metadata.get("bug_refs"), server_url),
        automation,
        path: rel_path.to_string(),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text_of).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn issue_refs(value: Option<&Value>, server_url: Option<&str>) -> Vec<IssueRef> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().map(text_of).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![text_of(other)],
    };
    items
        .into_iter()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .map(|text| {
            let url = server_url.and_then(|base| issue_url(base, &text));
            IssueRef { text, url }
        })
        .collect()
}

/// `group/project#123` -> `<base>/group/project/-/issues/123`.
pub fn issue_url(base: &str, reference: &str) -> Option<String> {
    let (project, iid) = reference.split_once('#')?;
    let valid_project =
        !project.is_empty() && !project.contains('#') && !project.chars().any(char::is_whitespace);
    let valid_iid = !iid.is_empty() && iid.bytes().all(|b| b.is_ascii_digit());
    if !(valid_project && valid_iid) || base.is_empty() {
        return None;
    }
    Some(format!("{}/{project}/-/issues/{iid}", base.trim_end_matches('/')))
}

fn join_refs(refs: &[IssueRef]) -> String {
    refs.iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_csv(rows: &[TraceRow]) -> String {
    let mut out = String::from('\u{feff}');
    push_csv_line(&mut out, CSV_COLUMNS.iter().map(|c| c.to_string()));
    for row in rows {
        push_csv_line(&mut out, row.csv_fields().into_iter());
    }
    out
}

fn push_csv_line(out: &mut String, fields: impl Iterator<Item = String>) {
    let quoted: Vec<String> = fields
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect();
    out.push_str(&quoted.join(","));
    out.push_str("\r\n");
}

pub fn trace_stats(rows: &[TraceRow], generated_at: String) -> TraceStats {
    let mut stats = TraceStats {
        by_app: BTreeMap::new(),
        by_suite: BTreeMap::new(),
        by_priority: BTreeMap::new(),
        total: rows.len() as u64,
        generated_at,
    };
    for row in rows {
        *stats.by_app.entry(row.app.clone()).or_insert(0) += 1;
        *stats.by_suite.entry(row.suite.clone()).or_insert(0) += 1;
        *stats.by_priority.entry(row.priority.clone()).or_insert(0) += 1;
    }
    stats
}

fn render_warnings(warnings: &[String]) -> String {
    if warnings.is_empty() {
        "No warnings.\n".to_string()
    } else {
        let mut text = warnings.join("\n");
        text.push('\n');
        text
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), TraceError> {
    fs::write(path, bytes).map_err(|source| TraceError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
