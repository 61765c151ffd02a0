//! Corpus-wide lint: every case document plus cross-file identifier checks.

use std::collections::BTreeMap;

use qa_core::{count_by_severity, LintFinding, Severity};
use qa_scope_cases::{lint_with_registry, parse, SchemaRegistry};
use serde_json::json;

use crate::corpus::{CorpusError, FsCorpus, IdScope};

pub const RULE_ID_FILENAME_MISMATCH: &str = "case-corpus/id-filename-mismatch";
pub const RULE_DUPLICATE_ID: &str = "case-corpus/duplicate-id";
pub const RULE_NOT_NORMALIZED: &str = "case-corpus/not-normalized";
pub const RULE_UNREADABLE: &str = "case-corpus/unreadable";

#[derive(Debug, Clone, Copy)]
pub struct CorpusLintOptions {
    pub scope: IdScope,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CorpusLintOutput {
    pub files_scanned: u64,
    pub errors: u64,
    pub warnings: u64,
    pub passed: bool,
    pub findings: Vec<LintFinding>,
}

pub fn run_corpus_lint(
    corpus: &FsCorpus,
    registry: &SchemaRegistry,
    options: CorpusLintOptions,
) -> Result<CorpusLintOutput, CorpusError> {
    let entries = corpus.list_all()?;
    let mut findings = Vec::new();
    // (app, area scope key, sequence) -> paths holding that id
    let mut holders: BTreeMap<(String, String, u64), Vec<String>> = BTreeMap::new();

    for entry in &entries {
        if let Some(id) = entry.case_id() {
            let area_key = match options.scope {
                IdScope::App => String::new(),
                IdScope::Area => entry.area_dir.clone(),
            };
            holders
                .entry((id.app().to_ascii_uppercase(), area_key, id.sequence()))
                .or_default()
                .push(entry.rel_path.clone());
        }

        let content = match corpus.read(entry) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %entry.rel_path, error = %err, "skipping unreadable case");
                findings.push(LintFinding::new(
                    RULE_UNREADABLE,
                    Severity::Error,
                    &entry.rel_path,
                    err.to_string(),
                ));
                continue;
            }
        };

        let result = lint_with_registry(&content, registry);
        findings.extend(result.findings(&entry.rel_path));
        let Some(normalized) = result.normalized_document else {
            continue;
        };

        let recorded_id = parse(&normalized)
            .ok()
            .and_then(|doc| doc.get_str("id").map(str::to_string));
        match recorded_id {
            Some(id) if id == entry.stem => {}
            Some(id) => findings.push(
                LintFinding::new(
                    RULE_ID_FILENAME_MISMATCH,
                    Severity::Error,
                    &entry.rel_path,
                    format!("front matter id `{id}` does not match file name `{}`", entry.stem),
                )
                .with_evidence(json!({ "id": id, "stem": entry.stem })),
            ),
            None => findings.push(LintFinding::new(
                RULE_ID_FILENAME_MISMATCH,
                Severity::Error,
                &entry.rel_path,
                format!("front matter has no id; file name is `{}`", entry.stem),
            )),
        }

        // Persisted cases are immutable; drift is reported, never rewritten.
        if normalized != content {
            findings.push(LintFinding::new(
                RULE_NOT_NORMALIZED,
                Severity::Warning,
                &entry.rel_path,
                "file differs from its normalized form".to_string(),
            ));
        }
    }

    for ((app, _, sequence), paths) in &holders {
        if paths.len() < 2 {
            continue;
        }
        for path in paths {
            let others: Vec<&String> = paths.iter().filter(|p| *p != path).collect();
            findings.push(
                LintFinding::new(
                    RULE_DUPLICATE_ID,
                    Severity::Error,
                    path,
                    format!(
                        "identifier {app}-TC-{sequence:03} is also used by {}",
                        others
                            .iter()
                            .map(|p| p.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
                .with_evidence(json!({ "others": others })),
            );
        }
    }

    findings.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
    let (errors, warnings) = count_by_severity(&findings);
    Ok(CorpusLintOutput {
        files_scanned: entries.len() as u64,
        errors,
        warnings,
        passed: errors == 0,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const CLEAN: &str = "---\nid: APP1-TC-001\napp: APP1\narea: Login\nsuite: Smoke\ntype: Functional\npriority: P1\nstatus: Draft\nstory_refs: []\nbug_refs: []\nowner: me\nautomation:\n  status: Planned\n  mapping: ''\nlinks: []\n---\n# Title\n";

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn options() -> CorpusLintOptions {
        CorpusLintOptions {
            scope: IdScope::App,
        }
    }

    #[test]
    fn clean_corpus_passes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app1/areas/login/APP1-TC-001.md", CLEAN);
        let out = run_corpus_lint(
            &FsCorpus::new(dir.path()),
            SchemaRegistry::builtin(),
            options(),
        )
        .unwrap();
        assert_eq!(out.files_scanned, 1);
        assert!(out.passed, "{:?}", out.findings);
        assert!(out.findings.is_empty(), "{:?}", out.findings);
    }

    #[test]
    fn reports_mismatch_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app1/areas/login/APP1-TC-001.md", CLEAN);
        write(
            dir.path(),
            "app1/areas/checkout/APP1-TC-001.md",
            &CLEAN.replace("area: Login", "area: Checkout"),
        );
        write(
            dir.path(),
            "app1/areas/login/APP1-TC-002.md",
            &CLEAN.replace("APP1-TC-001", "APP1-TC-009"),
        );
        let out = run_corpus_lint(
            &FsCorpus::new(dir.path()),
            SchemaRegistry::builtin(),
            options(),
        )
        .unwrap();
        let rules: Vec<_> = out
            .findings
            .iter()
            .map(|f| (f.path.as_str(), f.rule_id.as_str()))
            .collect();
        assert_eq!(
            rules,
            vec![
                ("app1/areas/checkout/APP1-TC-001.md", RULE_DUPLICATE_ID),
                ("app1/areas/login/APP1-TC-001.md", RULE_DUPLICATE_ID),
                ("app1/areas/login/APP1-TC-002.md", RULE_ID_FILENAME_MISMATCH),
            ]
        );
        assert!(!out.passed);
    }

    #[test]
    fn area_scope_allows_same_id_in_two_areas() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app1/areas/login/APP1-TC-001.md", CLEAN);
        write(
            dir.path(),
            "app1/areas/checkout/APP1-TC-001.md",
            &CLEAN.replace("area: Login", "area: Checkout"),
        );
        let out = run_corpus_lint(
            &FsCorpus::new(dir.path()),
            SchemaRegistry::builtin(),
            CorpusLintOptions {
                scope: IdScope::Area,
            },
        )
        .unwrap();
        assert!(out.passed, "{:?}", out.findings);
    }

    #[test]
    fn unnormalized_files_are_reported_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "app1/areas/login/APP1-TC-001.md";
        let drifted = "---\nowner: me\npriority: P1\nsuite: Smoke\narea: Login\napp: APP1\nid: APP1-TC-001\n---\n# Title\n";
        write(dir.path(), rel, drifted);
        let corpus = FsCorpus::new(dir.path());

        let out = run_corpus_lint(&corpus, SchemaRegistry::builtin(), options()).unwrap();
        assert_eq!(out.warnings, 1);
        assert_eq!(out.findings[0].rule_id, RULE_NOT_NORMALIZED);
        assert!(out.passed);
        assert_eq!(fs::read_to_string(dir.path().join(rel)).unwrap(), drifted);

        // A second run sees the same drift: nothing was rewritten.
        let again = run_corpus_lint(&corpus, SchemaRegistry::builtin(), options()).unwrap();
        assert_eq!(again.warnings, 1);
    }
}
