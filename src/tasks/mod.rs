//! Per-source ingesters. Each task knows how to cut its document into records and how to turn
//! one record into a [`RecordDraft`]; the session does the rest.

pub mod agn_bhm_database;
pub mod mcconnell_ma;
pub mod shen2008;
pub mod tremaine2002;

pub use agn_bhm_database::AgnBhmDatabaseTask;
pub use mcconnell_ma::McConnellMaTask;
pub use shen2008::Shen2008Task;
pub use tremaine2002::Tremaine2002Task;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CatalogError, Result};
use crate::session::{RawRecord, RecordDraft, RecordError};
use crate::vocab::Vocabulary;

pub trait IngestTask {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Input file name looked up in the input directory unless configured otherwise.
    fn default_file(&self) -> &'static str;
    /// Advisory record count for completeness checks.
    fn expected_total(&self) -> Option<usize>;
    /// Split the document into records in document order. Errors here are structural.
    fn tokenize(&self, document: &[u8]) -> std::result::Result<Vec<RawRecord>, RecordError>;
    /// Build the draft for one record; `Ok(None)` skips it silently.
    fn draft(
        &self,
        record: &RawRecord,
        vocab: &Vocabulary,
    ) -> std::result::Result<Option<RecordDraft>, RecordError>;
}

/// Registry of ingest tasks, in run order
pub struct TaskRegistry {
    tasks: Vec<Box<dyn IngestTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Registry with every built-in task
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Tremaine2002Task));
        registry.register(Box::new(McConnellMaTask));
        registry.register(Box::new(AgnBhmDatabaseTask));
        registry.register(Box::new(Shen2008Task));
        registry
    }

    /// Register a task; a task with the same name is replaced in place
    pub fn register(&mut self, task: Box<dyn IngestTask>) {
        match self.tasks.iter().position(|t| t.name() == task.name()) {
            Some(i) => self.tasks[i] = task,
            None => self.tasks.push(task),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn IngestTask> {
        self.tasks
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn IngestTask> {
        self.tasks.iter().map(|t| t.as_ref())
    }

    /// List all registered task names
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Tasks named in `names` in registry order, or all tasks when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<&dyn IngestTask>> {
        if let Some(unknown) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(CatalogError::UnknownTask(unknown.clone()));
        }
        Ok(self
            .iter()
            .filter(|t| names.is_empty() || names.iter().any(|n| n == t.name()))
            .collect())
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// `NGC 3227 (Mrk 1239)` style names
static NAME_WITH_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>.*?)\s*\((?P<alias>[^()]*)\)\s*$").unwrap());

/// Split `name (alias)` into its parts; plain labels come back without an alias.
pub(crate) fn split_name_alias(label: &str) -> (String, Option<String>) {
    match NAME_WITH_ALIAS.captures(label) {
        Some(caps) => (
            caps["name"].trim().to_string(),
            Some(caps["alias"].trim().to_string()),
        ),
        None => (label.trim().to_string(), None),
    }
}

/// Document bytes as text; undecodable input is a structural failure.
pub(crate) fn document_text(document: &[u8]) -> std::result::Result<&str, RecordError> {
    std::str::from_utf8(document)
        .map_err(|e| RecordError::Structural(format!("document is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_built_in_tasks() {
        let registry = TaskRegistry::standard();
        assert_eq!(
            registry.names(),
            vec!["tremaine2002", "mcconnell_ma", "agn_bhm_database", "shen2008"]
        );
        assert_eq!(registry.get("shen2008").unwrap().expected_total(), Some(77429));
    }

    #[test]
    fn test_select_keeps_registry_order() {
        let registry = TaskRegistry::standard();
        let picked = registry
            .select(&["shen2008".to_string(), "tremaine2002".to_string()])
            .unwrap();
        let names: Vec<_> = picked.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["tremaine2002", "shen2008"]);
        assert_eq!(registry.select(&[]).unwrap().len(), 4);
    }

    #[test]
    fn test_select_rejects_unknown_task() {
        let registry = TaskRegistry::standard();
        assert!(matches!(
            registry.select(&["hyperleda".to_string()]),
            Err(CatalogError::UnknownTask(name)) if name == "hyperleda"
        ));
    }

    #[test]
    fn test_split_name_alias() {
        assert_eq!(
            split_name_alias("N 3379 (M105)"),
            ("N 3379".to_string(), Some("M105".to_string()))
        );
        assert_eq!(split_name_alias(" Mrk335 "), ("Mrk335".to_string(), None));
    }

    #[test]
    fn test_non_utf8_document_is_structural() {
        assert!(matches!(
            document_text(&[0xff, 0xfe]),
            Err(RecordError::Structural(_))
        ));
    }
}
