use std::fs;
use std::path::Path;

use qa_cli::{
    build_traceability, init_project, load_project_config, persist_case, run_corpus_lint,
    CorpusLintOptions, FsCorpus, PersistRequest, TraceInput, CSV_FILE, JSON_FILE, STATS_FILE,
    WARNINGS_FILE,
};

fn draft(app: &str, area: &str, priority: &str, title: &str) -> String {
    format!(
        "---\napp: {app}\narea: {area}\nsuite: Smoke\npriority: {priority}\nowner: qa@example.com\nstory_refs:\n  - qa/web#12\n  - STORY-7\n---\n\n# {title}\n\n## Steps\n1. Open the page\n"
    )
}

fn persist(corpus: &FsCorpus, text: &str, root: &Path) -> String {
    let project = load_project_config(root).unwrap();
    let registry = project.load_registry().unwrap();
    persist_case(
        corpus,
        &registry,
        project.allocation_policy(),
        PersistRequest {
            markdown: text,
            ..Default::default()
        },
    )
    .unwrap()
    .id
    .to_string()
}

#[test]
fn scaffold_persist_lint_and_trace() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    init_project(root).unwrap();
    fs::write(
        root.join("qa.toml"),
        "[trace]\nserver_url = \"https://git.example.com/\"\n",
    )
    .unwrap();

    let project = load_project_config(root).unwrap();
    let corpus = FsCorpus::new(project.corpus_root());

    let drafts = [
        draft("APP1", "Login > UserName field", "P1", "Valid login"),
        draft("APP1", "Checkout", "P0", "Pay by card"),
        draft("WEB", "Search", "P2", "Empty query"),
    ];
    let ids: Vec<String> = drafts.iter().map(|d| persist(&corpus, d, root)).collect();
    assert_eq!(ids, vec!["APP1-TC-001", "APP1-TC-002", "WEB-TC-001"]);

    // Everything the persist step wrote is already canonical.
    let lint = run_corpus_lint(
        &corpus,
        &project.load_registry().unwrap(),
        CorpusLintOptions {
            scope: project.allocation_policy().scope,
        },
    )
    .unwrap();
    assert_eq!(lint.files_scanned, 3);
    assert!(lint.findings.is_empty(), "{:?}", lint.findings);

    // A hand-written file without front matter only produces a warning.
    let stray = project.corpus_root().join("web/areas/search/WEB-TC-002.md");
    fs::write(&stray, "# Notes only\n").unwrap();

    let out_dir = project.trace_out_dir();
    let output = build_traceability(TraceInput {
        corpus: &corpus,
        out_dir: out_dir.clone(),
        server_url: project.server_url(),
        generated_at: "2024-05-01T10:00:00Z".to_string(),
    })
    .unwrap();
    assert_eq!(output.files, 4);
    assert_eq!(output.rows, 4);
    assert_eq!(
        output.warnings,
        vec!["No front matter: web/areas/search/WEB-TC-002.md".to_string()]
    );
    assert_eq!(output.csv_sha256.len(), 64);

    let csv = fs::read_to_string(out_dir.join(CSV_FILE)).unwrap();
    let lines: Vec<&str> = csv.trim_end_matches("\r\n").split("\r\n").collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("\u{feff}\"ID\""));
    // Sorted by (app, id); the stray file has an empty app and sorts first.
    assert!(lines[1].starts_with("\"WEB-TC-002\",\"Notes only\",\"\""));
    assert!(lines[2]
        .starts_with("\"APP1-TC-001\",\"Valid login\",\"APP1\",\"Login > UserName field\""));
    assert!(lines[2].contains("\"qa/web#12, STORY-7\""));
    assert!(lines[3].starts_with("\"APP1-TC-002\""));
    assert!(lines[4].starts_with("\"WEB-TC-001\""));

    let rows: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join(JSON_FILE)).unwrap()).unwrap();
    assert_eq!(rows[1]["id"], "APP1-TC-001");
    let stories = &rows[1]["stories"];
    assert_eq!(
        stories[0]["url"],
        "https://git.example.com/qa/web/-/issues/12"
    );
    assert!(stories[1].get("url").is_none());

    let stats: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join(STATS_FILE)).unwrap()).unwrap();
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["by_app"]["APP1"], 2);
    assert_eq!(stats["by_priority"]["P0"], 1);
    assert_eq!(stats["generated_at"], "2024-05-01T10:00:00Z");

    let warnings = fs::read_to_string(out_dir.join(WARNINGS_FILE)).unwrap();
    assert_eq!(warnings, "No front matter: web/areas/search/WEB-TC-002.md\n");
}

#[test]
fn csv_digest_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    init_project(root).unwrap();
    let project = load_project_config(root).unwrap();
    let corpus = FsCorpus::new(project.corpus_root());
    persist(&corpus, &draft("APP1", "Login", "P1", "Login"), root);

    let run = |out: &str| {
        build_traceability(TraceInput {
            corpus: &corpus,
            out_dir: root.join(out),
            server_url: None,
            generated_at: "t".to_string(),
        })
        .unwrap()
        .csv_sha256
    };
    assert_eq!(run("a"), run("b"));
}
