use std::collections::BTreeMap;
use tracing::warn;

use super::JournalStore;
use crate::catalog::SourceRef;

/// Completeness of one task as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskVerification {
    pub task: String,
    pub expected: Option<usize>,
    /// Accepted count from the checkpoint; `None` when the task never flushed.
    pub accepted: Option<usize>,
    pub complete: bool,
    pub entries_tagged: usize,
}

impl TaskVerification {
    pub fn is_consistent(&self) -> bool {
        match (self.expected, self.accepted) {
            (Some(expected), Some(accepted)) => self.complete && expected == accepted,
            (None, Some(_)) => self.complete,
            (_, None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCitation {
    pub entry: String,
    pub key: String,
    pub source_ref: SourceRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub entries: usize,
    pub tasks: Vec<TaskVerification>,
    pub unresolved: Vec<UnresolvedCitation>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.tasks.iter().all(TaskVerification::is_consistent)
    }
}

/// Re-read the journal and check every task named in `expected`, plus any task found in the
/// checkpoints or on entries.
pub fn verify<J: JournalStore + ?Sized>(
    journal: &J,
    expected: &BTreeMap<String, Option<usize>>,
) -> anyhow::Result<VerificationReport> {
    let entries = journal.load_entries()?;
    let checkpoints = journal.checkpoints()?;

    let mut tagged: BTreeMap<String, usize> = BTreeMap::new();
    let mut unresolved = Vec::new();
    for entry in &entries {
        for task in &entry.tasks {
            *tagged.entry(task.clone()).or_default() += 1;
        }
        for (key, source_ref) in entry.unresolved_citations() {
            warn!(entry = %entry.name, key = %key, source_ref = %source_ref, "Unresolved citation");
            unresolved.push(UnresolvedCitation {
                entry: entry.name.clone(),
                key,
                source_ref,
            });
        }
    }

    let mut names: Vec<String> = expected.keys().cloned().collect();
    names.extend(checkpoints.iter().map(|c| c.task.clone()));
    names.extend(tagged.keys().cloned());
    names.sort();
    names.dedup();

    let tasks = names
        .into_iter()
        .map(|task| {
            let cp = checkpoints.iter().find(|c| c.task == task);
            let v = TaskVerification {
                expected: expected.get(&task).copied().flatten(),
                accepted: cp.map(|c| c.accepted),
                complete: cp.map(|c| c.complete).unwrap_or(false),
                entries_tagged: tagged.get(&task).copied().unwrap_or(0),
                task,
            };
            if !v.is_consistent() {
                warn!(
                    task = %v.task,
                    expected = ?v.expected,
                    accepted = ?v.accepted,
                    complete = v.complete,
                    "Task is incomplete in the journal"
                );
            }
            v
        })
        .collect();

    Ok(VerificationReport {
        entries: entries.len(),
        tasks,
        unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Entry, Fact, FactAttrs, SourceSpec};
    use crate::journal::{Checkpoint, InMemoryJournal};
    use chrono::Utc;
    use uuid::Uuid;

    fn tagged_entry(name: &str, task: &str) -> Entry {
        let mut e = Entry::new(name);
        let r = e.add_source(SourceSpec::bibcode("2002ApJ...574..740T")).unwrap();
        let sources = crate::catalog::SourceRefs::single(r);
        e.append_fact("mass", Fact::new("1e8", sources, FactAttrs::new()));
        e.add_task(task);
        e
    }

    fn checkpoint(task: &str, accepted: usize, complete: bool) -> Checkpoint {
        Checkpoint {
            task: task.to_string(),
            digest: String::new(),
            next_record: accepted,
            accepted,
            complete,
            run_id: Uuid::new_v4(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_complete_task_verifies() {
        let mut journal = InMemoryJournal::new();
        let a = tagged_entry("NGC3379", "tremaine2002");
        let b = tagged_entry("NGC4486", "tremaine2002");
        journal.write_entries(&[&a, &b]).unwrap();
        journal.save_checkpoint(&checkpoint("tremaine2002", 2, true)).unwrap();

        let expected = BTreeMap::from([("tremaine2002".to_string(), Some(2))]);
        let report = verify(&journal, &expected).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.tasks[0].entries_tagged, 2);
    }

    #[test]
    fn test_short_or_missing_tasks_are_flagged() {
        let mut journal = InMemoryJournal::new();
        let a = tagged_entry("NGC3379", "tremaine2002");
        journal.write_entries(&[&a]).unwrap();
        journal.save_checkpoint(&checkpoint("tremaine2002", 1, true)).unwrap();

        let expected = BTreeMap::from([
            ("tremaine2002".to_string(), Some(31)),
            ("shen2008".to_string(), Some(77429)),
        ]);
        let report = verify(&journal, &expected).unwrap();
        assert!(!report.is_clean());
        assert!(report.tasks.iter().all(|t| !t.is_consistent()));
        let shen = report.tasks.iter().find(|t| t.task == "shen2008").unwrap();
        assert_eq!(shen.accepted, None);
    }

    #[test]
    fn test_unresolved_citations_are_reported() {
        let mut journal = InMemoryJournal::new();
        let mut e = Entry::new("NGC3379");
        e.append_fact("mass", Fact::new("1e8", "4".parse().unwrap(), FactAttrs::new()));
        journal.write_entries(&[&e]).unwrap();

        let report = verify(&journal, &BTreeMap::new()).unwrap();
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].source_ref.get(), 4);
    }
}
