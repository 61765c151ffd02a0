//! Corpus-side operations for QA test cases: identifier allocation, persist,
//! corpus lint, traceability and project scaffolding.

mod allocator;
mod case_lint;
mod config;
mod corpus;
mod persist;
mod project_init;
mod scanner;
mod traceability;

pub use allocator::{AllocError, Allocation, AllocationPolicy, Allocator, DEFAULT_MAX_ATTEMPTS};
pub use case_lint::{
    run_corpus_lint, CorpusLintOptions, CorpusLintOutput, RULE_DUPLICATE_ID,
    RULE_ID_FILENAME_MISMATCH, RULE_NOT_NORMALIZED, RULE_UNREADABLE,
};
pub use config::{
    load_project_config, parse_config, AllocationSection, ConfigError, CorpusSection,
    ProjectConfig, QaConfig, SchemaSection, TraceSection, QA_TOML,
};
pub use corpus::{
    CorpusEntry, CorpusError, CorpusStore, CreateOutcome, FsCorpus, IdScope, MemoryCorpus,
    Reservation, LOCK_FILE_NAME,
};
pub use persist::{persist_case, PersistError, PersistOutcome, PersistRequest};
pub use project_init::{init_project, InitError, InitProjectOutput};
pub use scanner::highest_sequence;
pub use traceability::{
    build_traceability, collect_rows, issue_url, render_csv, trace_stats, IssueRef, TraceError,
    TraceInput, TraceOutput, TraceRow, TraceStats, CSV_FILE, JSON_FILE, STATS_FILE,
    WARNINGS_FILE,
};
