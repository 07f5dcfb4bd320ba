//! Drives one task at a time over its input document: draft, validate and commit each record,
//! flush to the journal in batches, checkpoint progress and reconcile against the expected count.

pub mod record;

pub use record::{Cite, DraftFact, DraftPhotometry, RawRecord, RecordDraft, RecordError};

use anyhow::Context;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::journal::{document_digest, Checkpoint, JournalStore};
use crate::metrics::SessionMetrics;
use crate::tasks::IngestTask;
use crate::vocab::Vocabulary;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Complete,
    Aborted,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Complete => "complete",
            TaskState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Accepted records between flushes.
    pub batch_size: usize,
    /// Stop after this many accepted records in one run.
    pub limit: Option<usize>,
    /// Continue from a checkpoint whose document digest matches.
    pub resume: bool,
    /// Expected record counts that override a task's built-in figure.
    pub expected: BTreeMap<String, usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            resume: true,
            expected: BTreeMap::new(),
        }
    }
}

/// Outcome of one task run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: String,
    pub state: TaskState,
    pub run_id: Uuid,
    pub expected: Option<usize>,
    /// Accepted records including those from the run being resumed.
    pub accepted: usize,
    pub accepted_this_run: usize,
    pub records_seen: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub resumed_from: Option<usize>,
    pub limited: bool,
    pub flushes: usize,
    pub warnings: Vec<String>,
    pub abort_reason: Option<String>,
}

impl TaskReport {
    fn new(task: &str, expected: Option<usize>) -> Self {
        Self {
            task: task.to_string(),
            state: TaskState::Idle,
            run_id: Uuid::new_v4(),
            expected,
            accepted: 0,
            accepted_this_run: 0,
            records_seen: 0,
            skipped: 0,
            dropped: 0,
            resumed_from: None,
            limited: false,
            flushes: 0,
            warnings: Vec::new(),
            abort_reason: None,
        }
    }

    fn abort(&mut self, reason: String) {
        warn!(task = %self.task, reason = %reason, "Task aborted");
        SessionMetrics::record_aborted(&self.task);
        self.state = TaskState::Aborted;
        self.abort_reason = Some(reason);
    }

    /// `Some(true)` when the accepted count equals the expected one.
    pub fn matches_expected(&self) -> Option<bool> {
        self.expected.map(|e| e == self.accepted)
    }
}

pub struct IngestionSession<J: JournalStore> {
    catalog: Catalog,
    journal: J,
    vocab: Vocabulary,
    options: SessionOptions,
}

impl<J: JournalStore> IngestionSession<J> {
    pub fn new(catalog: Catalog, journal: J, vocab: Vocabulary, options: SessionOptions) -> Self {
        Self {
            catalog,
            journal,
            vocab,
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    pub fn into_parts(self) -> (Catalog, J) {
        (self.catalog, self.journal)
    }

    fn expected_total(&self, task: &dyn IngestTask) -> Option<usize> {
        self.options
            .expected
            .get(task.name())
            .copied()
            .or_else(|| task.expected_total())
    }

    /// Read the task's document from `path` and run it. An unreadable document aborts the task.
    pub fn run_file(&mut self, task: &dyn IngestTask, path: &Path) -> anyhow::Result<TaskReport> {
        match std::fs::read(path) {
            Ok(bytes) => self.run_task(task, &bytes),
            Err(e) => {
                let mut report = TaskReport::new(task.name(), self.expected_total(task));
                report.abort(format!("cannot read {}: {}", path.display(), e));
                Ok(report)
            }
        }
    }

    /// Ingest one document. Record-level failures end up in the report; only storage failures
    /// are returned as errors.
    #[instrument(skip(self, task, document), fields(task = %task.name()))]
    pub fn run_task(
        &mut self,
        task: &dyn IngestTask,
        document: &[u8],
    ) -> anyhow::Result<TaskReport> {
        let name = task.name();
        let mut report = TaskReport::new(name, self.expected_total(task));
        let digest = document_digest(document);
        report.state = TaskState::Running;
        info!(run_id = %report.run_id, bytes = document.len(), "Starting task");

        let records = match task.tokenize(document) {
            Ok(records) => records,
            Err(e) => {
                report.abort(e.to_string());
                return Ok(report);
            }
        };

        let mut start = 0;
        if self.options.resume {
            if let Some(cp) = self.journal.load_checkpoint(name)? {
                if cp.digest == digest {
                    info!(
                        next_record = cp.next_record,
                        accepted = cp.accepted,
                        "Resuming from checkpoint"
                    );
                    start = cp.next_record;
                    report.accepted = cp.accepted;
                    report.resumed_from = Some(cp.next_record);
                } else {
                    info!("Input document changed since the last checkpoint; starting over");
                }
            }
        }

        let batch_size = self.options.batch_size.max(1);
        let mut since_flush = 0;
        let mut next_record = start;

        for record in records.iter().filter(|r| r.index >= start) {
            if self.options.limit.is_some_and(|limit| report.accepted_this_run >= limit) {
                report.limited = true;
                break;
            }
            report.records_seen += 1;

            match self.process(task, record, &mut report) {
                Ok(true) => {
                    report.accepted += 1;
                    report.accepted_this_run += 1;
                    since_flush += 1;
                    SessionMetrics::record_accepted(name);
                }
                Ok(false) => {
                    report.skipped += 1;
                    SessionMetrics::record_skipped(name);
                }
                Err(e) if e.is_fatal() => {
                    report.abort(format!("record {}: {}", record.index, e));
                    self.flush(name, &digest, record.index, false, &mut report)?;
                    return Ok(report);
                }
                Err(RecordError::Skipped(reason)) => {
                    report.skipped += 1;
                    SessionMetrics::record_skipped(name);
                    report.warnings.push(format!("record {}: {}", record.index, reason));
                    warn!(record = record.index, reason = %reason, "Skipping row");
                }
                Err(e) => {
                    report.dropped += 1;
                    SessionMetrics::record_dropped(name, e.kind());
                    report.warnings.push(format!("record {}: dropped: {}", record.index, e));
                    warn!(record = record.index, error = %e, "Dropping record");
                }
            }
            next_record = record.index + 1;

            if since_flush >= batch_size {
                self.flush(name, &digest, next_record, false, &mut report)?;
                since_flush = 0;
            }
        }

        if !report.limited {
            next_record = next_record.max(records.last().map(|r| r.index + 1).unwrap_or(0));
        }
        self.flush(name, &digest, next_record, !report.limited, &mut report)?;
        report.state = TaskState::Complete;
        self.reconcile(&mut report);
        Ok(report)
    }

    /// `Ok(true)` when the record was committed, `Ok(false)` when the task skips it.
    fn process(
        &mut self,
        task: &dyn IngestTask,
        record: &RawRecord,
        report: &mut TaskReport,
    ) -> Result<bool, RecordError> {
        let Some(mut draft) = task.draft(record, &self.vocab)? else {
            return Ok(false);
        };
        let validated = draft.validate(&self.catalog);
        report
            .warnings
            .extend(record::drain_warnings(task.name(), &mut draft));
        validated?;

        let name = draft.commit(&mut self.catalog, task.name())?;
        debug!(record = record.index, entry = %name, "Committed record");
        Ok(true)
    }

    /// Write every entry touched since the last flush, then the checkpoint.
    fn flush(
        &mut self,
        task: &str,
        digest: &str,
        next_record: usize,
        complete: bool,
        report: &mut TaskReport,
    ) -> anyhow::Result<()> {
        let started = Instant::now();
        let written = self
            .journal
            .write_entries(&self.catalog.dirty_entries())
            .with_context(|| format!("flushing entries for {}", task))?;
        self.journal
            .save_checkpoint(&Checkpoint {
                task: task.to_string(),
                digest: digest.to_string(),
                next_record,
                accepted: report.accepted,
                complete,
                run_id: report.run_id,
                updated_at: Utc::now(),
            })
            .with_context(|| format!("saving checkpoint for {}", task))?;
        self.catalog.mark_clean();

        report.flushes += 1;
        SessionMetrics::record_flush(written, started.elapsed().as_secs_f64());
        debug!(entries = written, next_record, accepted = report.accepted, "Flushed");
        Ok(())
    }

    fn reconcile(&self, report: &mut TaskReport) {
        let Some(expected) = report.expected else {
            info!(accepted = report.accepted, "Task complete");
            return;
        };
        if report.accepted == expected {
            info!(accepted = report.accepted, expected, "Task complete");
        } else if report.limited {
            info!(
                accepted = report.accepted,
                expected,
                "Task stopped at the record limit"
            );
        } else {
            let msg = format!(
                "{}: accepted {} records, expected {}",
                report.task, report.accepted, expected
            );
            warn!(accepted = report.accepted, expected, "Record count mismatch");
            report.warnings.push(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FactAttrs, SourceSpec};
    use crate::journal::InMemoryJournal;
    use crate::vocab::Vocabulary;

    /// "name|mass|method" lines; `!` as a name is a structural failure.
    struct LinesTask;

    impl IngestTask for LinesTask {
        fn name(&self) -> &'static str {
            "lines"
        }

        fn description(&self) -> &'static str {
            "test lines"
        }

        fn default_file(&self) -> &'static str {
            "lines.txt"
        }

        fn expected_total(&self) -> Option<usize> {
            Some(3)
        }

        fn tokenize(&self, document: &[u8]) -> Result<Vec<RawRecord>, RecordError> {
            let text = std::str::from_utf8(document)
                .map_err(|e| RecordError::Structural(e.to_string()))?;
            Ok(text
                .lines()
                .enumerate()
                .map(|(i, l)| RawRecord::new(i, l.split('|').map(str::to_string).collect()))
                .collect())
        }

        fn draft(
            &self,
            record: &RawRecord,
            vocab: &Vocabulary,
        ) -> Result<Option<RecordDraft>, RecordError> {
            let name = record.cell(0);
            if name.starts_with('#') {
                return Ok(None);
            }
            if name == "!" {
                return Err(RecordError::Structural("bang".into()));
            }
            let methods = vocab.map_mass_methods(record.cell(2))?;
            let mut draft = RecordDraft::new(name);
            let c = draft.cite(SourceSpec::named(format!("ref-{}", record.index)));
            let attrs = FactAttrs::new().kind(methods.canonical());
            draft.measurement("mass", record.cell(1), attrs, &[c]);
            Ok(Some(draft))
        }
    }

    fn session(options: SessionOptions) -> IngestionSession<InMemoryJournal> {
        IngestionSession::new(
            Catalog::default(),
            InMemoryJournal::new(),
            Vocabulary::standard(),
            options,
        )
    }

    #[test]
    fn test_run_counts_and_drops() {
        let doc = b"# header\nN3379|1e8|s\nNGC3379|1.2e8|Q9\nN 3379|1.4e8|g\nNGC4486|3e9|g";
        let mut s = session(SessionOptions::default());
        let report = s.run_task(&LinesTask, doc).unwrap();
        assert_eq!(report.state, TaskState::Complete);
        assert_eq!(report.accepted, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.matches_expected(), Some(true));
        assert!(report.warnings.iter().any(|w| w.contains("Q9")));

        let entry = s.journal().entry("NGC3379").unwrap();
        assert_eq!(entry.facts("mass").len(), 2);
    }

    #[test]
    fn test_structural_failure_aborts_after_flush() {
        let doc = b"N3379|1e8|s\n!|1|s\nNGC4486|3e9|g";
        let mut s = session(SessionOptions::default());
        let report = s.run_task(&LinesTask, doc).unwrap();
        assert_eq!(report.state, TaskState::Aborted);
        assert!(s.journal().entry("NGC3379").is_some());
        assert!(s.journal().entry("NGC4486").is_none());
        let cp = s.journal().load_checkpoint("lines").unwrap().unwrap();
        assert_eq!(cp.next_record, 1);
        assert!(!cp.complete);
    }

    #[test]
    fn test_batches_flush_and_mismatch_warns() {
        let doc = b"NGC1|1|s\nNGC2|1|s\nNGC3|1|s\nNGC4|1|s\nNGC5|1|s";
        let mut s = session(SessionOptions {
            batch_size: 2,
            ..Default::default()
        });
        let report = s.run_task(&LinesTask, doc).unwrap();
        assert_eq!(report.accepted, 5);
        assert_eq!(report.flushes, 3);
        assert_eq!(report.matches_expected(), Some(false));
        assert!(report.warnings.iter().any(|w| w.contains("expected 3")));
        assert_eq!(s.journal().writes(), 5);
    }

    #[test]
    fn test_limit_then_resume() {
        let doc = b"NGC1|1|s\nNGC2|1|s\nNGC3|1|s";
        let mut s = session(SessionOptions {
            limit: Some(2),
            ..Default::default()
        });
        let first = s.run_task(&LinesTask, doc).unwrap();
        assert!(first.limited);
        assert_eq!(first.accepted, 2);
        assert!(first.warnings.is_empty());

        let (catalog, journal) = s.into_parts();
        let options = SessionOptions::default();
        let mut s = IngestionSession::new(catalog, journal, Vocabulary::standard(), options);
        let second = s.run_task(&LinesTask, doc).unwrap();
        assert_eq!(second.resumed_from, Some(2));
        assert_eq!(second.accepted_this_run, 1);
        assert_eq!(second.accepted, 3);
        assert_eq!(second.matches_expected(), Some(true));
    }

    #[test]
    fn test_rerun_of_complete_task_adds_nothing() {
        let doc = b"N3379|1e8|s";
        let mut s = session(SessionOptions::default());
        s.run_task(&LinesTask, doc).unwrap();
        let again = s.run_task(&LinesTask, doc).unwrap();
        assert_eq!(again.records_seen, 0);
        assert_eq!(again.accepted, 1);
        assert_eq!(s.catalog().entry("NGC3379").unwrap().facts("mass").len(), 1);
    }

    #[test]
    fn test_configured_expected_total_wins() {
        let mut expected = BTreeMap::new();
        expected.insert("lines".to_string(), 1);
        let mut s = session(SessionOptions {
            expected,
            ..Default::default()
        });
        let report = s.run_task(&LinesTask, b"N3379|1e8|s").unwrap();
        assert_eq!(report.expected, Some(1));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_unreadable_file_aborts() {
        let mut s = session(SessionOptions::default());
        let report = s
            .run_file(&LinesTask, Path::new("/nonexistent/lines.txt"))
            .unwrap();
        assert_eq!(report.state, TaskState::Aborted);
        assert!(report.abort_reason.unwrap().contains("cannot read"));
    }
}
