use std::collections::HashMap;
use std::fmt;
use std::io;

use crate::directory::{DirectoryHandle, Entry};
use crate::names::parse_names;
use crate::report::{PairResult, ReconciliationReport};

/// Original and desired name taken from the same position of both lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePair {
    pub original: String,
    pub desired: String,
}

impl RenamePair {
    pub fn is_identity(&self) -> bool {
        self.original == self.desired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NotFound,
    RenameRejected,
}

impl FailureReason {
    pub fn label(self) -> &'static str {
        match self {
            FailureReason::NotFound => "not-found",
            FailureReason::RenameRejected => "rejected",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::NotFound => "does not exist",
            FailureReason::RenameRejected => "rename was rejected",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Skipped,
    Applied,
    Failed(FailureReason),
}

impl RenameOutcome {
    pub fn label(self) -> &'static str {
        match self {
            RenameOutcome::Skipped => "skipped",
            RenameOutcome::Applied => "applied",
            RenameOutcome::Failed(reason) => reason.label(),
        }
    }
}

/// Errors that stop a run before any rename is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("before and after line counts differ: {before}, {after}")]
    LengthMismatch { before: usize, after: usize },

    #[error("unable to list directory entries: {0}")]
    Snapshot(#[source] io::Error),
}

/// What will happen to one pair when the plan runs.
#[derive(Debug, Clone)]
pub enum PlanStep {
    Skip,
    Rename(Entry),
    Missing,
}

#[derive(Debug, Clone)]
pub struct PlannedRename {
    pub index: usize,
    pub pair: RenamePair,
    pub step: PlanStep,
}

/// Pairs resolved against one directory listing, in list order.
#[derive(Debug, Clone)]
pub struct RenamePlan {
    steps: Vec<PlannedRename>,
}

impl RenamePlan {
    pub fn steps(&self) -> &[PlannedRename] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of pairs that will reach the directory's rename operation.
    pub fn pending_renames(&self) -> usize {
        self.steps
            .iter()
            .filter(|planned| matches!(planned.step, PlanStep::Rename(_)))
            .count()
    }

    /// Runs every step in order. A failed pair never stops the run.
    pub fn execute<D>(self, directory: &mut D) -> ReconciliationReport
    where
        D: DirectoryHandle + ?Sized,
    {
        let results = self
            .steps
            .into_iter()
            .map(|planned| {
                let outcome = match &planned.step {
                    PlanStep::Skip => RenameOutcome::Skipped,
                    PlanStep::Missing => RenameOutcome::Failed(FailureReason::NotFound),
                    PlanStep::Rename(entry) => {
                        if directory.rename(entry, &planned.pair.desired) {
                            RenameOutcome::Applied
                        } else {
                            RenameOutcome::Failed(FailureReason::RenameRejected)
                        }
                    }
                };
                PairResult {
                    index: planned.index,
                    pair: planned.pair,
                    outcome,
                }
            })
            .collect();
        ReconciliationReport::new(results)
    }
}

/// Parses both lists, checks their shape and resolves every pair against a
/// fresh listing of `directory`. Nothing is renamed.
///
/// Each original name is looked up in that single listing. A name produced by
/// an earlier pair of the same run is therefore not visible to later pairs.
pub fn plan<D>(
    before_text: &str,
    after_text: &str,
    directory: &D,
) -> Result<RenamePlan, ReconcileError>
where
    D: DirectoryHandle + ?Sized,
{
    let befores = parse_names(before_text);
    let afters = parse_names(after_text);
    if befores.len() != afters.len() {
        return Err(ReconcileError::LengthMismatch {
            before: befores.len(),
            after: afters.len(),
        });
    }

    let snapshot: HashMap<String, Entry> = directory
        .list_entries()
        .map_err(ReconcileError::Snapshot)?
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect();

    let steps = befores
        .into_iter()
        .zip(afters)
        .enumerate()
        .map(|(index, (original, desired))| {
            let pair = RenamePair { original, desired };
            let step = if pair.is_identity() {
                PlanStep::Skip
            } else {
                match snapshot.get(&pair.original) {
                    Some(entry) => PlanStep::Rename(entry.clone()),
                    None => PlanStep::Missing,
                }
            };
            PlannedRename { index, pair, step }
        })
        .collect();

    Ok(RenamePlan { steps })
}

/// Plans and executes in one call.
pub fn reconcile<D>(
    before_text: &str,
    after_text: &str,
    directory: &mut D,
) -> Result<ReconciliationReport, ReconcileError>
where
    D: DirectoryHandle + ?Sized,
{
    let planned = plan(before_text, after_text, &*directory)?;
    Ok(planned.execute(directory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::EntryHandle;
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use time::OffsetDateTime;

    /// In-memory directory that records every rename request.
    #[derive(Default)]
    struct FakeDirectory {
        names: BTreeSet<String>,
        listings: Cell<usize>,
        renames: Vec<(String, String)>,
        fail_listing: bool,
    }

    impl FakeDirectory {
        fn with(names: &[&str]) -> Self {
            Self {
                names: names.iter().map(|name| name.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl DirectoryHandle for FakeDirectory {
        fn list_entries(&self) -> io::Result<Vec<Entry>> {
            self.listings.set(self.listings.get() + 1);
            if self.fail_listing {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            Ok(self
                .names
                .iter()
                .map(|name| Entry {
                    name: name.clone(),
                    is_directory: false,
                    size: 0,
                    last_modified: OffsetDateTime::UNIX_EPOCH,
                    handle: EntryHandle::new(name),
                })
                .collect())
        }

        fn rename(&mut self, entry: &Entry, new_name: &str) -> bool {
            self.renames.push((entry.name.clone(), new_name.to_string()));
            if self.names.contains(new_name) || !self.names.remove(&entry.name) {
                return false;
            }
            self.names.insert(new_name.to_string());
            true
        }
    }

    #[test]
    fn one_outcome_per_pair_in_input_order() {
        let mut dir = FakeDirectory::with(&["a.txt", "b.txt", "c.txt"]);
        let report = reconcile("c.txt\na.txt\nb.txt\n", "c.txt\nx.txt\ny.txt\n", &mut dir)
            .expect("report");

        let outcomes: Vec<_> = report.results().iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                RenameOutcome::Skipped,
                RenameOutcome::Applied,
                RenameOutcome::Applied
            ]
        );
        let originals: Vec<_> = report
            .results()
            .iter()
            .map(|r| r.pair.original.as_str())
            .collect();
        assert_eq!(originals, vec!["c.txt", "a.txt", "b.txt"]);
        assert_eq!(
            dir.renames,
            vec![
                ("a.txt".to_string(), "x.txt".to_string()),
                ("b.txt".to_string(), "y.txt".to_string())
            ]
        );
    }

    #[test]
    fn length_mismatch_touches_nothing() {
        let mut dir = FakeDirectory::with(&["a.txt", "b.txt", "c.txt"]);
        let err = plan("a.txt\nb.txt\nc.txt", "x.txt\ny.txt", &dir).expect_err("mismatch");

        assert!(matches!(
            err,
            ReconcileError::LengthMismatch {
                before: 3,
                after: 2
            }
        ));
        assert_eq!(err.to_string(), "before and after line counts differ: 3, 2");
        assert_eq!(dir.listings.get(), 0);

        let err = reconcile("a.txt\nb.txt\nc.txt", "x.txt\ny.txt", &mut dir).expect_err("mismatch");
        assert!(matches!(err, ReconcileError::LengthMismatch { .. }));
        assert!(dir.renames.is_empty());
    }

    #[test]
    fn identity_pairs_are_skipped_without_rename_calls() {
        let mut dir = FakeDirectory::with(&["a.txt", "b.txt"]);
        let report = reconcile("a.txt\nb.txt", "a.txt\nb.txt", &mut dir).expect("report");

        assert_eq!(report.total(), 2);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.applied(), 0);
        assert_eq!(report.failed(), 0);
        assert!(dir.renames.is_empty());
    }

    #[test]
    fn missing_original_is_not_found_and_never_renamed() {
        let mut dir = FakeDirectory::with(&["real.txt"]);
        let report = reconcile("ghost.txt", "real.txt", &mut dir).expect("report");

        assert_eq!(
            report.results()[0].outcome,
            RenameOutcome::Failed(FailureReason::NotFound)
        );
        assert_eq!(report.failed(), 1);
        assert!(dir.renames.is_empty());
    }

    #[test]
    fn single_rename_is_applied_once() {
        let mut dir = FakeDirectory::with(&["a.txt"]);
        let report = reconcile("a.txt", "z.txt", &mut dir).expect("report");

        assert_eq!(report.results()[0].outcome, RenameOutcome::Applied);
        assert_eq!(dir.renames, vec![("a.txt".to_string(), "z.txt".to_string())]);
        assert!(dir.names.contains("z.txt"));
    }

    #[test]
    fn rejected_rename_does_not_stop_the_run() {
        let mut dir = FakeDirectory::with(&["a.txt", "b.txt", "c.txt"]);
        let report = reconcile("a.txt\nghost.txt\nc.txt", "b.txt\nq.txt\nd.txt", &mut dir)
            .expect("report");

        let outcomes: Vec<_> = report.results().iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                RenameOutcome::Failed(FailureReason::RenameRejected),
                RenameOutcome::Failed(FailureReason::NotFound),
                RenameOutcome::Applied
            ]
        );
        assert_eq!(report.applied(), 1);
        assert_eq!(report.failed(), 2);
        let failed: Vec<_> = report.failures().map(|r| r.index).collect();
        assert_eq!(failed, vec![0, 1]);
    }

    #[test]
    fn later_pairs_resolve_against_the_initial_listing() {
        let mut dir = FakeDirectory::with(&["a.txt"]);
        let report = reconcile(
            "a.txt\nrenamed_a.txt",
            "renamed_a.txt\nc.txt",
            &mut dir,
        )
        .expect("report");

        assert_eq!(report.results()[0].outcome, RenameOutcome::Applied);
        assert_eq!(
            report.results()[1].outcome,
            RenameOutcome::Failed(FailureReason::NotFound)
        );
        assert!(dir.names.contains("renamed_a.txt"));
        assert_eq!(dir.renames.len(), 1);
    }

    #[test]
    fn snapshot_failure_is_reported_before_any_rename() {
        let mut dir = FakeDirectory {
            fail_listing: true,
            ..FakeDirectory::with(&["a.txt"])
        };
        let err = reconcile("a.txt", "b.txt", &mut dir).expect_err("listing fails");
        assert!(matches!(err, ReconcileError::Snapshot(_)));
        assert!(dir.renames.is_empty());
    }

    /// Lists the same name twice, as broken storage might.
    #[derive(Default)]
    struct DuplicateNameDirectory {
        renamed_handles: Vec<std::path::PathBuf>,
    }

    impl DirectoryHandle for DuplicateNameDirectory {
        fn list_entries(&self) -> io::Result<Vec<Entry>> {
            Ok(["first", "second"]
                .into_iter()
                .map(|handle| Entry {
                    name: "a.txt".to_string(),
                    is_directory: false,
                    size: 0,
                    last_modified: OffsetDateTime::UNIX_EPOCH,
                    handle: EntryHandle::new(handle),
                })
                .collect())
        }

        fn rename(&mut self, entry: &Entry, _new_name: &str) -> bool {
            self.renamed_handles.push(entry.handle.path().to_path_buf());
            true
        }
    }

    #[test]
    fn last_listed_entry_wins_for_duplicate_names() {
        let mut dir = DuplicateNameDirectory::default();
        let report = reconcile("a.txt", "b.txt", &mut dir).expect("report");

        assert_eq!(report.applied(), 1);
        assert_eq!(
            dir.renamed_handles,
            vec![std::path::PathBuf::from("second")]
        );
    }

    #[test]
    fn empty_lists_make_an_empty_report() {
        let mut dir = FakeDirectory::with(&["a.txt"]);
        let report = reconcile("\n", "", &mut dir).expect("report");
        assert_eq!(report.total(), 0);
        assert!(!report.has_failures());
    }

    #[test]
    fn plan_resolves_steps_without_renaming() {
        let dir = FakeDirectory::with(&["a.txt", "b.txt"]);
        let planned = plan("a.txt\nb.txt\nghost", "a.txt\nc.txt\nx", &dir).expect("plan");

        assert_eq!(planned.len(), 3);
        assert_eq!(planned.pending_renames(), 1);
        assert!(matches!(planned.steps()[0].step, PlanStep::Skip));
        assert!(matches!(&planned.steps()[1].step, PlanStep::Rename(entry) if entry.name == "b.txt"));
        assert!(matches!(planned.steps()[2].step, PlanStep::Missing));
        assert_eq!(dir.listings.get(), 1);
        assert!(dir.renames.is_empty());
    }
}
