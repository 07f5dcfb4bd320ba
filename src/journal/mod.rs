//! Durable storage for the catalog: one pretty-printed JSON file per entry plus a SQLite store
//! of task checkpoints.

pub mod checkpoint;
pub mod verify;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use verify::{verify, TaskVerification, UnresolvedCitation, VerificationReport};

use anyhow::Context;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::catalog::{Catalog, Entry, FailurePolicy, NameRules};

pub trait JournalStore {
    /// Persist the given entries, replacing earlier versions. Returns how many were written.
    fn write_entries(&mut self, entries: &[&Entry]) -> anyhow::Result<usize>;
    fn load_entries(&self) -> anyhow::Result<Vec<Entry>>;
    fn load_checkpoint(&self, task: &str) -> anyhow::Result<Option<Checkpoint>>;
    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> anyhow::Result<()>;
    fn clear_checkpoint(&mut self, task: &str) -> anyhow::Result<()>;
    fn checkpoints(&self) -> anyhow::Result<Vec<Checkpoint>>;
}

/// Journal directory on disk.
pub struct Journal {
    dir: PathBuf,
    meta: CheckpointStore,
}

impl Journal {
    /// Open (creating if needed) the journal at `dir`, with checkpoints in `dir/<meta_db>`.
    pub fn open<P: AsRef<Path>>(dir: P, meta_db: &str) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating journal directory {}", dir.display()))?;
        let meta = CheckpointStore::open(dir.join(meta_db))
            .with_context(|| format!("opening checkpoint store in {}", dir.display()))?;
        Ok(Self { dir, meta })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(entry_file_name(name))
    }
}

impl JournalStore for Journal {
    fn write_entries(&mut self, entries: &[&Entry]) -> anyhow::Result<usize> {
        for entry in entries {
            let path = self.entry_path(&entry.name);
            let json = serde_json::to_string_pretty(entry)?;
            write_atomic(&path, json.as_bytes())
                .with_context(|| format!("writing {}", path.display()))?;
        }
        debug!(count = entries.len(), dir = %self.dir.display(), "Journaled entries");
        Ok(entries.len())
    }

    fn load_entries(&self) -> anyhow::Result<Vec<Entry>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let entry: Entry = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn load_checkpoint(&self, task: &str) -> anyhow::Result<Option<Checkpoint>> {
        self.meta.get(task)
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        self.meta.put(checkpoint)
    }

    fn clear_checkpoint(&mut self, task: &str) -> anyhow::Result<()> {
        self.meta.remove(task)
    }

    fn checkpoints(&self) -> anyhow::Result<Vec<Checkpoint>> {
        self.meta.all()
    }
}

/// Journal kept in memory, for tests and dry runs.
#[derive(Default)]
pub struct InMemoryJournal {
    entries: BTreeMap<String, Entry>,
    checkpoints: BTreeMap<String, Checkpoint>,
    writes: usize,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entry writes across all flushes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }
}

impl JournalStore for InMemoryJournal {
    fn write_entries(&mut self, entries: &[&Entry]) -> anyhow::Result<usize> {
        for entry in entries {
            self.entries.insert(entry.name.clone(), (*entry).clone());
        }
        self.writes += entries.len();
        Ok(entries.len())
    }

    fn load_entries(&self) -> anyhow::Result<Vec<Entry>> {
        Ok(self.entries.values().cloned().collect())
    }

    fn load_checkpoint(&self, task: &str) -> anyhow::Result<Option<Checkpoint>> {
        Ok(self.checkpoints.get(task).cloned())
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        self.checkpoints
            .insert(checkpoint.task.clone(), checkpoint.clone());
        Ok(())
    }

    fn clear_checkpoint(&mut self, task: &str) -> anyhow::Result<()> {
        self.checkpoints.remove(task);
        Ok(())
    }

    fn checkpoints(&self) -> anyhow::Result<Vec<Checkpoint>> {
        Ok(self.checkpoints.values().cloned().collect())
    }
}

/// Build a catalog holding everything already journaled.
pub fn open_catalog<J: JournalStore + ?Sized>(
    journal: &J,
    rules: NameRules,
    policy: FailurePolicy,
) -> anyhow::Result<Catalog> {
    let mut catalog = Catalog::new(rules, policy);
    for entry in journal.load_entries()? {
        let name = entry.name.clone();
        catalog
            .insert_loaded(entry)
            .with_context(|| format!("loading journaled entry {}", name))?;
    }
    catalog.mark_clean();
    info!(entries = catalog.len(), "Loaded journal");
    Ok(catalog)
}

/// SHA-256 hex of an input document.
pub fn document_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// File name for an entry. Names made of safe characters are used as-is; anything else is
/// sanitized and suffixed with a short hash so distinct names never collide.
pub fn entry_file_name(name: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_');
    if !name.is_empty() && name.chars().all(safe) && !name.starts_with('.') {
        return format!("{}.json", name);
    }
    let cleaned: String = name
        .chars()
        .map(|c| if safe(c) { c } else { '_' })
        .collect();
    let digest = document_digest(name.as_bytes());
    format!("{}~{}.json", cleaned.trim_start_matches('.'), &digest[..8])
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
