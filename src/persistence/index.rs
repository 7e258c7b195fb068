//! Turn index: an append-only `index.jsonl` of [`TurnRecord`]s, letting
//! Phase 2.1 find recent-turn and older-turn candidates without re-reading
//! every archived `context.md`. Mirrors the teacher's `AuditLogger::list_runs`
//! pattern but as a single append log instead of one file per run.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use crate::errors::PersistenceError;
use crate::persistence::TurnRecord;

pub struct TurnIndex {
    index_path: PathBuf,
}

impl TurnIndex {
    pub fn new(turns_dir: impl Into<PathBuf>) -> Self {
        let turns_dir = turns_dir.into();
        Self { index_path: turns_dir.join("index.jsonl") }
    }

    pub fn append(&self, record: &TurnRecord) -> Result<(), PersistenceError> {
        let line = serde_json::to_string(record).map_err(|e| PersistenceError::SerializeFailed {
            turn_id: record.turn_id,
            source_message: e.to_string(),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.index_path)
            .map_err(|e| PersistenceError::WriteFailed { artifact: "index.jsonl", turn_id: record.turn_id, source: e })?;
        writeln!(file, "{line}")
            .map_err(|e| PersistenceError::WriteFailed { artifact: "index.jsonl", turn_id: record.turn_id, source: e })?;
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<TurnRecord>, PersistenceError> {
        if !self.index_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.index_path).map_err(|e| PersistenceError::WriteFailed {
            artifact: "index.jsonl",
            turn_id: uuid::Uuid::nil(),
            source: e,
        })?;
        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let record: TurnRecord = serde_json::from_str(line).map_err(|e| PersistenceError::SerializeFailed {
                turn_id: uuid::Uuid::nil(),
                source_message: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// The `limit` most recent turns, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<TurnRecord>, PersistenceError> {
        let mut records = self.load_all()?;
        records.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        records.truncate(limit);
        Ok(records)
    }

    /// Turns whose keywords or resolved query overlap `keyword`.
    pub fn find_by_keyword(&self, keyword: &str) -> Result<Vec<TurnRecord>, PersistenceError> {
        let needle = keyword.to_lowercase();
        let records = self.load_all()?;
        Ok(records
            .into_iter()
            .filter(|r| {
                r.keywords.iter().any(|k| k.to_lowercase().contains(&needle))
                    || r.resolved_query.to_lowercase().contains(&needle)
            })
            .collect())
    }
}
