mod case_id;
mod lint;
mod span;

pub use case_id::{is_placeholder, CaseId, CaseIdError, CASE_ID_INFIX};
pub use lint::{count_by_severity, LintFinding, Severity};
pub use span::Span;
