//! Where test cases live inside a corpus directory.
//!
//! Layout: `<app lowercase>/areas/<area dir>/<ID>.md`, relative to the corpus
//! root. `Login > UserName field` maps to the area dir `login/username-field`.

use qa_core::CaseId;

pub const CASE_EXTENSION: &str = "md";
pub const AREAS_DIR: &str = "areas";

/// Corpus-relative glob that every case document matches.
pub const CASE_FILE_PATTERN: &str = "*/areas/**/*.md";

/// Match a corpus-relative file path against a glob pattern.
///
/// Supports `*` (single segment wildcard) and `**` (recursive wildcard).
pub fn matches_pattern(path: &str, pattern: &str) -> bool {
    let path = path.replace('\\', "/");
    glob_match::glob_match(pattern, &path)
}

/// Directory segment for an application code.
pub fn app_dir(app: &str) -> String {
    sanitize_segment(app)
}

/// Directory path for an area, one segment per `>`-separated part.
pub fn area_to_repo_dir(area: &str) -> String {
    area.split('>')
        .map(sanitize_segment)
        .filter(|part| !part.is_empty() && part != "." && part != "..")
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize_segment(part: &str) -> String {
    part.trim()
        .to_lowercase()
        .replace([' ', '/', '\\'], "-")
}

/// Corpus-relative directory holding the cases of one area.
pub fn area_relative_dir(app: &str, area: &str) -> String {
    let area_dir = area_to_repo_dir(area);
    if area_dir.is_empty() {
        format!("{}/{AREAS_DIR}", app_dir(app))
    } else {
        format!("{}/{AREAS_DIR}/{area_dir}", app_dir(app))
    }
}

/// Corpus-relative path of the document holding `id`.
pub fn case_relative_path(area: &str, id: &CaseId) -> String {
    format!(
        "{}/{id}.{CASE_EXTENSION}",
        area_relative_dir(id.app(), area)
    )
}

/// Parts of a corpus-relative case path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasePath<'a> {
    pub app_dir: &'a str,
    pub area_dir: &'a str,
    pub stem: &'a str,
}

/// Split a corpus-relative path into its parts.
///
/// Returns `None` for anything outside the case layout, including hidden
/// files (temporaries, lock files) and hidden directories.
pub fn split_case_path(rel: &str) -> Option<CasePath<'_>> {
    if !matches_pattern(rel, CASE_FILE_PATTERN) || rel.contains('\\') {
        return None;
    }
    if rel.split('/').any(|seg| seg.starts_with('.')) {
        return None;
    }
    let (app_dir, rest) = rel.split_once('/')?;
    let rest = rest.strip_prefix(AREAS_DIR)?.strip_prefix('/')?;
    let (area_dir, file) = rest.rsplit_once('/').unwrap_or(("", rest));
    let stem = file.strip_suffix(".md")?;
    if stem.is_empty() {
        return None;
    }
    Some(CasePath {
        app_dir,
        area_dir,
        stem,
    })
}
