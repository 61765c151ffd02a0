//! Reserve-and-verify identifier allocation.
//!
//! A candidate is computed from a fresh scan, then published through the
//! store's create-if-absent primitive. Losing a race means re-scanning and
//! trying again, up to `max_attempts` times.

use std::convert::Infallible;
use std::fmt::Display;

use qa_core::CaseId;

use crate::corpus::{CorpusError, CorpusStore, CreateOutcome, IdScope, Reservation};
use crate::scanner::highest_sequence;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPolicy {
    pub max_attempts: u32,
    pub scope: IdScope,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scope: IdScope::App,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error(
        "identifier space of `{app}` still contended after {attempts} attempt(s) (last candidate {last_candidate}); retry later"
    )]
    Exhausted {
        app: String,
        attempts: u32,
        last_candidate: String,
    },
    #[error("application code `{0}` cannot be used in an identifier")]
    InvalidApp(String),
    #[error("sequence space of `{0}` overflowed")]
    Overflow(String),
    #[error("could not render the document for {id}: {message}")]
    Render { id: String, message: String },
    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

impl AllocError {
    /// Exhaustion is transient: the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocError::Exhausted { .. })
    }
}

/// A committed allocation: the id and the corpus entry that now holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub id: CaseId,
    pub rel_path: String,
    pub attempts: u32,
}

pub struct Allocator<'s, S: CorpusStore + ?Sized> {
    store: &'s S,
    policy: AllocationPolicy,
}

impl<'s, S: CorpusStore + ?Sized> Allocator<'s, S> {
    pub fn new(store: &'s S, policy: AllocationPolicy) -> Self {
        Self { store, policy }
    }

    /// Next identifier a scan would propose. Reserves nothing.
    pub fn peek_next(&self, app: &str, area: Option<&str>) -> Result<CaseId, AllocError> {
        validate_app(app)?;
        let highest = highest_sequence(self.store, app, self.area_filter(area))?;
        successor(app, highest)
    }

    /// Allocate a fresh identifier and publish `render(id)` under it.
    pub fn allocate<F>(
        &self,
        app: &str,
        area: &str,
        mut render: F,
    ) -> Result<Allocation, AllocError>
    where
        F: FnMut(&CaseId) -> String,
    {
        self.allocate_preferring(app, area, None, |id| Ok::<_, Infallible>(render(id)))
    }

    /// Like [`Allocator::allocate`], but tries `preferred` first. A taken
    /// preferred id falls back to the scanned sequence.
    ///
    /// `render` runs before each reservation; if it fails nothing is
    /// published and the error is returned as [`AllocError::Render`].
    pub fn allocate_preferring<F, E>(
        &self,
        app: &str,
        area: &str,
        preferred: Option<&CaseId>,
        mut render: F,
    ) -> Result<Allocation, AllocError>
    where
        F: FnMut(&CaseId) -> Result<String, E>,
        E: Display,
    {
        validate_app(app)?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut pending_preferred = preferred.filter(|id| id.app() == app).cloned();
        // Highest sequence this call has lost; keeps retries moving forward
        // even when the scan lags behind a competing writer.
        let mut lost_floor = 0u64;
        let mut last_candidate = None;

        for attempt in 1..=max_attempts {
            let (candidate, from_scan) = match pending_preferred.take() {
                Some(id) => (id, false),
                None => (self.next_candidate(app, area, lost_floor)?, true),
            };
            tracing::debug!(app, candidate = %candidate, attempt, "reserving identifier");

            let content = render(&candidate).map_err(|err| AllocError::Render {
                id: candidate.to_string(),
                message: err.to_string(),
            })?;
            let reservation = Reservation {
                id: &candidate,
                area,
                scope: self.policy.scope,
                content: &content,
            };
            match self.store.create_if_absent(&reservation)? {
                CreateOutcome::Created { rel_path } => {
                    tracing::info!(
                        id = %candidate,
                        path = %rel_path,
                        attempt,
                        "allocated identifier"
                    );
                    return Ok(Allocation {
                        id: candidate,
                        rel_path,
                        attempts: attempt,
                    });
                }
                CreateOutcome::Conflict { existing } => {
                    tracing::warn!(
                        candidate = %candidate,
                        existing = %existing,
                        attempt,
                        "identifier already taken; rescanning"
                    );
                    if from_scan {
                        lost_floor = lost_floor.max(candidate.sequence());
                    }
                    last_candidate = Some(candidate);
                }
            }
        }

        Err(AllocError::Exhausted {
            app: app.to_string(),
            attempts: max_attempts,
            last_candidate: last_candidate
                .map(|id| id.to_string())
                .unwrap_or_default(),
        })
    }

    fn next_candidate(&self, app: &str, area: &str, lost_floor: u64) -> Result<CaseId, AllocError> {
        let highest = highest_sequence(self.store, app, self.area_filter(Some(area)))?;
        successor(app, highest.max(lost_floor))
    }

    fn area_filter<'a>(&self, area: Option<&'a str>) -> Option<&'a str> {
        match self.policy.scope {
            IdScope::App => None,
            IdScope::Area => area,
        }
    }
}

fn successor(app: &str, highest: u64) -> Result<CaseId, AllocError> {
    highest
        .checked_add(1)
        .and_then(|seq| CaseId::from_raw(app, seq))
        .ok_or_else(|| AllocError::Overflow(app.to_string()))
}

fn validate_app(app: &str) -> Result<(), AllocError> {
    let usable = !app.is_empty()
        && !app
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '\\' | '.'));
    if usable {
        Ok(())
    } else {
        Err(AllocError::InvalidApp(app.to_string()))
    }
}
