use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use qa_cli::{
    persist_case, AllocError, AllocationPolicy, Allocator, CorpusEntry, CorpusError, CorpusStore,
    CreateOutcome, FsCorpus, IdScope, MemoryCorpus, PersistError, PersistRequest, Reservation,
};
use qa_scope_cases::SchemaRegistry;

const THREADS: usize = 8;

fn allocate_concurrently<S: CorpusStore + 'static>(store: Arc<S>) -> Vec<u64> {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|n| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let area = if n % 2 == 0 { "Login" } else { "Checkout" };
                let allocator = Allocator::new(store.as_ref(), AllocationPolicy::default());
                // Exhaustion under the shipped ceiling is retryable; callers retry.
                loop {
                    match allocator.allocate("APP1", area, |id| format!("---\nid: {id}\n---\n")) {
                        Ok(allocation) => break allocation.id.sequence(),
                        Err(err) if err.is_retryable() => continue,
                        Err(err) => panic!("allocation failed: {err}"),
                    }
                }
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("thread joins"))
        .collect()
}

#[test]
fn concurrent_allocations_on_disk_are_gapless() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(FsCorpus::new(dir.path()));
    let sequences = allocate_concurrently(Arc::clone(&corpus));

    let unique: BTreeSet<u64> = sequences.iter().copied().collect();
    assert_eq!(unique.len(), THREADS, "duplicate ids: {sequences:?}");
    assert_eq!(unique, (1..=THREADS as u64).collect());

    let entries = corpus.list_entries("APP1").unwrap();
    assert_eq!(entries.len(), THREADS);
    for entry in &entries {
        let text = std::fs::read_to_string(corpus.absolute(&entry.rel_path)).unwrap();
        assert_eq!(text, format!("---\nid: {}\n---\n", entry.stem));
    }
}

#[test]
fn concurrent_allocations_in_memory_are_gapless() {
    let corpus = Arc::new(MemoryCorpus::new());
    let sequences = allocate_concurrently(Arc::clone(&corpus));
    let unique: BTreeSet<u64> = sequences.into_iter().collect();
    assert_eq!(unique, (1..=THREADS as u64).collect());
    assert_eq!(corpus.paths().len(), THREADS);
}

/// Commits `APP1-TC-003` on behalf of another caller right before the first
/// reservation reaches the inner store.
struct CompetingWriter<S> {
    inner: S,
    fired: AtomicBool,
}

impl<S: CorpusStore> CorpusStore for CompetingWriter<S> {
    fn list_entries(&self, app: &str) -> Result<Vec<CorpusEntry>, CorpusError> {
        self.inner.list_entries(app)
    }

    fn create_if_absent(
        &self,
        reservation: &Reservation<'_>,
    ) -> Result<CreateOutcome, CorpusError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let rival = qa_core::CaseId::from_raw("APP1", 3).unwrap();
            let outcome = self.inner.create_if_absent(&Reservation {
                id: &rival,
                area: "Login",
                scope: IdScope::App,
                content: "rival",
            })?;
            assert!(matches!(outcome, CreateOutcome::Created { .. }));
        }
        self.inner.create_if_absent(reservation)
    }
}

#[test]
fn losing_a_race_rescans_and_takes_the_next_id() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = FsCorpus::new(dir.path());
    for seq in 1..=2 {
        let id = qa_core::CaseId::from_raw("APP1", seq).unwrap();
        corpus
            .create_if_absent(&Reservation {
                id: &id,
                area: "Login",
                scope: IdScope::App,
                content: "seed",
            })
            .unwrap();
    }

    let store = CompetingWriter {
        inner: corpus,
        fired: AtomicBool::new(false),
    };
    let allocator = Allocator::new(&store, AllocationPolicy::default());
    assert_eq!(
        allocator.peek_next("APP1", None).unwrap().to_string(),
        "APP1-TC-003"
    );

    let allocation = allocator
        .allocate("APP1", "Login", |id| format!("mine {id}"))
        .unwrap();
    assert_eq!(allocation.id.to_string(), "APP1-TC-004");
    assert_eq!(allocation.attempts, 2);

    let login = dir.path().join("app1/areas/login");
    let rival = std::fs::read_to_string(login.join("APP1-TC-003.md")).unwrap();
    assert_eq!(rival, "rival");
    let mine = std::fs::read_to_string(login.join("APP1-TC-004.md")).unwrap();
    assert_eq!(mine, "mine APP1-TC-004");
}

/// Store that never lets a reservation through.
struct Saturated;

impl CorpusStore for Saturated {
    fn list_entries(&self, _app: &str) -> Result<Vec<CorpusEntry>, CorpusError> {
        Ok(Vec::new())
    }

    fn create_if_absent(
        &self,
        reservation: &Reservation<'_>,
    ) -> Result<CreateOutcome, CorpusError> {
        Ok(CreateOutcome::Conflict {
            existing: reservation.rel_path(),
        })
    }
}

#[test]
fn persist_reports_exhaustion_as_retryable() {
    let err = persist_case(
        &Saturated,
        SchemaRegistry::builtin(),
        AllocationPolicy::default(),
        PersistRequest {
            markdown: "---\napp: APP1\narea: Login\nsuite: S\npriority: P1\nowner: me\n---\n",
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(err.is_retryable());
    let PersistError::Alloc(AllocError::Exhausted { attempts, .. }) = err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(attempts, 5);
}

#[test]
fn failed_persist_leaves_no_entry() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = FsCorpus::new(dir.path());
    let err = persist_case(
        &corpus,
        SchemaRegistry::builtin(),
        AllocationPolicy::default(),
        PersistRequest {
            markdown: "---\napp: APP1\narea: Login\n---\n",
            strict: true,
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, PersistError::Rejected(_)));
    assert!(corpus.list_all().unwrap().is_empty());
}
