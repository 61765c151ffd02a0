use std::fs;
use std::path::{Path, PathBuf};

use crate::config::QA_TOML;

const QA_TOML_TEMPLATE: &str = r#"[corpus]
root = "apps"

[allocation]
max_attempts = 5
scope = "app"

[schema]
registry = "meta/case-schema.toml"

[trace]
out_dir = "traceability"
server_url = ""
"#;

const CASE_SCHEMA_TEMPLATE: &str = r#"# Additional front-matter fields. Built-in keys cannot be redefined.
registry_version = 1

# [[fields]]
# key = "component"
# allowed_values = ["web", "api"]
# default = "web"
# kind = "string"
"#;

const TRACE_GITIGNORE_TEMPLATE: &str = "*\n!.gitignore\n";

#[derive(Debug, thiserror::Error)]
#[error("init {path}: {source}")]
pub struct InitError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone)]
pub struct InitProjectOutput {
    pub root: PathBuf,
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

/// Scaffold a project. Existing files are never overwritten.
pub fn init_project(root: &Path) -> Result<InitProjectOutput, InitError> {
    if !root.exists() {
        fs::create_dir_all(root).map_err(|source| InitError {
            path: root.to_path_buf(),
            source,
        })?;
    }

    let mut created = Vec::new();
    let mut existing = Vec::new();

    ensure_file(
        &root.join(QA_TOML),
        QA_TOML,
        QA_TOML_TEMPLATE,
        &mut created,
        &mut existing,
    )?;
    ensure_dir(&root.join("apps"), "apps", &mut created, &mut existing)?;
    ensure_dir(&root.join("meta"), "meta", &mut created, &mut existing)?;
    ensure_file(
        &root.join("meta").join("case-schema.toml"),
        "meta/case-schema.toml",
        CASE_SCHEMA_TEMPLATE,
        &mut created,
        &mut existing,
    )?;
    ensure_dir(
        &root.join("traceability"),
        "traceability",
        &mut created,
        &mut existing,
    )?;
    ensure_file(
        &root.join("traceability").join(".gitignore"),
        "traceability/.gitignore",
        TRACE_GITIGNORE_TEMPLATE,
        &mut created,
        &mut existing,
    )?;

    Ok(InitProjectOutput {
        root: root.to_path_buf(),
        created,
        existing,
    })
}

fn ensure_dir(
    path: &Path,
    rel: &str,
    created: &mut Vec<String>,
    existing: &mut Vec<String>,
) -> Result<(), InitError> {
    if path.exists() {
        existing.push(rel.to_string());
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| InitError {
        path: path.to_path_buf(),
        source,
    })?;
    created.push(rel.to_string());
    Ok(())
}

fn ensure_file(
    path: &Path,
    rel: &str,
    content: &str,
    created: &mut Vec<String>,
    existing: &mut Vec<String>,
) -> Result<(), InitError> {
    if path.exists() {
        existing.push(rel.to_string());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| InitError {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| InitError {
        path: path.to_path_buf(),
        source,
    })?;
    created.push(rel.to_string());
    Ok(())
}
