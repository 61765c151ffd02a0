//! Project configuration from `qa.toml`.
//!
//! Every section is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};

use qa_scope_cases::SchemaRegistry;
use serde::Deserialize;

use crate::allocator::{AllocationPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::corpus::IdScope;

pub const QA_TOML: &str = "qa.toml";

const MAX_ATTEMPTS_CEILING: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("schema extension {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: qa_scope_cases::SchemaError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QaConfig {
    pub corpus: CorpusSection,
    pub allocation: AllocationSection,
    pub schema: SchemaSection,
    pub trace: TraceSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CorpusSection {
    pub root: PathBuf,
}

impl Default for CorpusSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("apps"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AllocationSection {
    pub max_attempts: u32,
    pub scope: IdScope,
}

impl Default for AllocationSection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scope: IdScope::App,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchemaSection {
    pub registry: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TraceSection {
    pub out_dir: PathBuf,
    pub server_url: Option<String>,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("traceability"),
            server_url: None,
        }
    }
}

/// Configuration bound to the project root it was loaded from.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub config: QaConfig,
    /// `qa.toml` that was read, if any.
    pub source: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn corpus_root(&self) -> PathBuf {
        self.root.join(&self.config.corpus.root)
    }

    pub fn trace_out_dir(&self) -> PathBuf {
        self.root.join(&self.config.trace.out_dir)
    }

    /// Issue tracker base URL without trailing slash; empty means unset.
    pub fn server_url(&self) -> Option<&str> {
        self.config
            .trace
            .server_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    pub fn allocation_policy(&self) -> AllocationPolicy {
        AllocationPolicy {
            max_attempts: self.config.allocation.max_attempts,
            scope: self.config.allocation.scope,
        }
    }

    /// Built-in schema, extended from `[schema] registry` when configured.
    pub fn load_registry(&self) -> Result<SchemaRegistry, ConfigError> {
        let Some(rel) = &self.config.schema.registry else {
            return Ok(SchemaRegistry::builtin().clone());
        };
        let path = self.root.join(rel);
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        SchemaRegistry::with_extension_toml(&content)
            .map_err(|source| ConfigError::Schema { path, source })
    }
}

pub fn load_project_config(root: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = root.join(QA_TOML);
    if !path.exists() {
        return Ok(ProjectConfig {
            root: root.to_path_buf(),
            config: QaConfig::default(),
            source: None,
        });
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = parse_config(&content).map_err(|err| match err {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.clone(),
            message,
        },
        other => other,
    })?;
    tracing::debug!(path = %path.display(), "loaded project configuration");
    Ok(ProjectConfig {
        root: root.to_path_buf(),
        config,
        source: Some(path),
    })
}

pub fn parse_config(content: &str) -> Result<QaConfig, ConfigError> {
    let config: QaConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: PathBuf::from(QA_TOML),
        message: e.to_string(),
    })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &QaConfig) -> Result<(), ConfigError> {
    let attempts = config.allocation.max_attempts;
    if attempts == 0 || attempts > MAX_ATTEMPTS_CEILING {
        return Err(ConfigError::Invalid(format!(
            "allocation.max_attempts must be within 1..={MAX_ATTEMPTS_CEILING}, got {attempts}"
        )));
    }
    if config.corpus.root.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("corpus.root must not be empty".into()));
    }
    Ok(())
}
