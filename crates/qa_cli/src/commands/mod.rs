//! Command implementations for qa-cli

use std::io::Read;
use std::path::Path;

use qa_cli::{AllocationPolicy, FsCorpus, IdScope, ProjectConfig};

pub mod ids;
pub mod lint;
pub mod trace;

/// Shared state for commands that operate on a configured project.
pub struct Context {
    pub project: ProjectConfig,
    pub json: bool,
}

impl Context {
    pub fn corpus(&self) -> FsCorpus {
        FsCorpus::new(self.project.corpus_root())
    }

    pub fn policy(&self, scope: Option<IdScope>, max_attempts: Option<u32>) -> AllocationPolicy {
        let mut policy = self.project.allocation_policy();
        if let Some(scope) = scope {
            policy.scope = scope;
        }
        if let Some(max_attempts) = max_attempts {
            policy.max_attempts = max_attempts.max(1);
        }
        policy
    }
}

/// Why a command did not succeed, and with which exit status.
#[derive(Debug)]
pub enum Failure {
    Error(String),
    /// `--strict` run that collected warnings.
    StrictWarnings(String),
    /// Transient contention; the same command may succeed later.
    Retryable(String),
}

impl Failure {
    pub fn exit_code(&self) -> i32 {
        match self {
            Failure::Error(_) => 1,
            Failure::StrictWarnings(_) => 2,
            Failure::Retryable(_) => 3,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Failure::Error(msg) | Failure::StrictWarnings(msg) | Failure::Retryable(msg) => msg,
        }
    }
}

impl From<String> for Failure {
    fn from(msg: String) -> Self {
        Failure::Error(msg)
    }
}

pub type CommandResult = Result<(), Failure>;

/// Read a draft from a file, or from stdin for `-`.
pub(crate) fn read_input(path: &Path) -> Result<String, String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|err| format!("read stdin: {}", err))?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|err| format!("read {}: {}", path.display(), err))
}

/// Path label used in findings for an input argument.
pub(crate) fn input_label(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn current_utc_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
