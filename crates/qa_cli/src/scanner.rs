use qa_scope_cases::layout::area_to_repo_dir;

use crate::corpus::{CorpusError, CorpusStore};

/// Highest sequence number already used by `app`, or 0 for a fresh app.
///
/// With an area filter only entries stored under that area count. Files whose
/// names are not case identifiers of `app` are skipped.
pub fn highest_sequence<S>(store: &S, app: &str, area: Option<&str>) -> Result<u64, CorpusError>
where
    S: CorpusStore + ?Sized,
{
    let entries = store.list_entries(app)?;
    let area_dir = area.map(area_to_repo_dir);

    let mut highest = 0u64;
    let mut counted = 0usize;
    let mut skipped = 0usize;
    for entry in &entries {
        if let Some(dir) = &area_dir {
            if &entry.area_dir != dir {
                continue;
            }
        }
        match entry.case_id() {
            Some(id) if id.belongs_to(app) => {
                counted += 1;
                highest = highest.max(id.sequence());
            }
            _ => skipped += 1,
        }
    }

    tracing::debug!(app, area = ?area, highest, counted, skipped, "scanned identifier space");
    Ok(highest)
}
