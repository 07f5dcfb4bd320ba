use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use uuid::Uuid;

/// Progress of one task over one input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub task: String,
    /// SHA-256 hex of the document the progress refers to.
    pub digest: String,
    /// Index of the first record not yet reflected in the journal.
    pub next_record: usize,
    pub accepted: usize,
    pub complete: bool,
    pub run_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// SQLite metadata store kept next to the journaled entries.
pub struct CheckpointStore {
    conn: Connection,
}

impl CheckpointStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS task_checkpoints (
                task         TEXT PRIMARY KEY,
                digest       TEXT NOT NULL,
                next_record  INTEGER NOT NULL,
                accepted     INTEGER NOT NULL,
                complete     INTEGER NOT NULL DEFAULT 0,
                run_id       TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, task: &str) -> anyhow::Result<Option<Checkpoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT task, digest, next_record, accepted, complete, run_id, updated_at
             FROM task_checkpoints WHERE task = ?1",
        )?;
        let mut rows = stmt.query(params![task])?;
        match rows.next()? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, cp: &Checkpoint) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO task_checkpoints (task, digest, next_record, accepted, complete, run_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(task) DO UPDATE SET digest=excluded.digest, next_record=excluded.next_record,
                accepted=excluded.accepted, complete=excluded.complete, run_id=excluded.run_id,
                updated_at=excluded.updated_at",
            params![
                cp.task,
                cp.digest,
                cp.next_record as i64,
                cp.accepted as i64,
                cp.complete,
                cp.run_id.to_string(),
                cp.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, task: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM task_checkpoints WHERE task = ?1", params![task])?;
        Ok(())
    }

    pub fn all(&self) -> anyhow::Result<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT task, digest, next_record, accepted, complete, run_id, updated_at
             FROM task_checkpoints ORDER BY task",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(from_row(row)?);
        }
        Ok(out)
    }
}

fn from_row(row: &rusqlite::Row<'_>) -> anyhow::Result<Checkpoint> {
    let run_id: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Checkpoint {
        task: row.get(0)?,
        digest: row.get(1)?,
        next_record: row.get::<_, i64>(2)? as usize,
        accepted: row.get::<_, i64>(3)? as usize,
        complete: row.get(4)?,
        run_id: Uuid::parse_str(&run_id)?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc),
    })
}
