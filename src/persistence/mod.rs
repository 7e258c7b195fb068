//! Turn persistence: each finished turn is archived under
//! `<turns_dir>/<turn_id>/` as `context.md` (the rendered document),
//! `claims.jsonl` (one claim per line, across every §4 entry and §6's
//! source map), and `record.json` (the [`TurnRecord`] the index keys on).
//! Adapted from the teacher's `AuditLogger`: fail fast on I/O, no silent
//! partial writes.

pub mod index;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::document::{ContextDocument, TurnStatus};
use crate::errors::PersistenceError;

/// Durable summary of one turn, written alongside the full document and
/// indexed for later recall by Phase 2.1's memory staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub raw_query: String,
    pub resolved_query: String,
    pub status: TurnStatus,
    pub response_text: Option<String>,
    pub keywords: Vec<String>,
}

/// Writes one turn's archive to `<turns_dir>/<turn_id>/`.
pub struct TurnWriter {
    turns_dir: PathBuf,
}

impl TurnWriter {
    pub fn new(turns_dir: impl Into<PathBuf>) -> Self {
        Self { turns_dir: turns_dir.into() }
    }

    fn turn_dir(&self, turn_id: Uuid) -> PathBuf {
        self.turns_dir.join(turn_id.to_string())
    }

    /// Writes `context.md`, `claims.jsonl`, and `record.json` for `doc`,
    /// returning the record that should be handed to the turn index.
    pub fn write(&self, doc: &ContextDocument, status: TurnStatus) -> Result<TurnRecord, PersistenceError> {
        let dir = self.turn_dir(doc.turn_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| PersistenceError::CreateDirFailed { path: dir.clone(), source: e })?;

        std::fs::write(dir.join("context.md"), doc.render_markdown())
            .map_err(|e| PersistenceError::WriteFailed { artifact: "context.md", turn_id: doc.turn_id, source: e })?;

        let claims = collect_claims_jsonl(doc).map_err(|e| PersistenceError::SerializeFailed {
            turn_id: doc.turn_id,
            source_message: e.to_string(),
        })?;
        std::fs::write(dir.join("claims.jsonl"), claims)
            .map_err(|e| PersistenceError::WriteFailed { artifact: "claims.jsonl", turn_id: doc.turn_id, source: e })?;

        let record = build_record(doc, status);
        let record_json = serde_json::to_string_pretty(&record).map_err(|e| PersistenceError::SerializeFailed {
            turn_id: doc.turn_id,
            source_message: e.to_string(),
        })?;
        std::fs::write(dir.join("record.json"), record_json)
            .map_err(|e| PersistenceError::WriteFailed { artifact: "record.json", turn_id: doc.turn_id, source: e })?;

        Ok(record)
    }

    pub fn archive_path(&self, turn_id: Uuid) -> PathBuf {
        self.turn_dir(turn_id)
    }

    pub fn load_record(&self, turn_id: Uuid) -> Result<TurnRecord, PersistenceError> {
        let path = self.turn_dir(turn_id).join("record.json");
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| PersistenceError::WriteFailed { artifact: "record.json", turn_id, source: e })?;
        serde_json::from_str(&raw)
            .map_err(|e| PersistenceError::SerializeFailed { turn_id, source_message: e.to_string() })
    }
}

fn collect_claims_jsonl(doc: &ContextDocument) -> Result<String, serde_json::Error> {
    let mut lines = Vec::new();
    for entry in &doc.section_4().entries {
        for claim in &entry.claims {
            lines.push(serde_json::to_string(claim)?);
        }
    }
    Ok(lines.join("\n"))
}

fn build_record(doc: &ContextDocument, status: TurnStatus) -> TurnRecord {
    let query = doc.section_0();
    let response_text = doc.section_6().map(|d| d.text.clone());
    let keywords = query
        .map(|q| q.action_verbs.clone())
        .unwrap_or_default();

    TurnRecord {
        turn_id: doc.turn_id,
        session_id: doc.session_id.clone(),
        started_at: doc.started_at,
        finished_at: Utc::now(),
        raw_query: query.map(|q| q.raw_query.clone()).unwrap_or_default(),
        resolved_query: query.map(|q| q.resolved_query.clone()).unwrap_or_default(),
        status,
        response_text,
        keywords,
    }
}

pub fn archive_path_for(turns_dir: &Path, turn_id: Uuid) -> PathBuf {
    turns_dir.join(turn_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DataRequirements, Mode, QuerySection, UserPurpose};
    use tempfile::tempdir;

    fn sample_doc() -> ContextDocument {
        let mut doc = ContextDocument::new("s1", Mode::Chat);
        doc.commit_section_0(QuerySection {
            raw_query: "what's the weather".into(),
            resolved_query: "what's the weather".into(),
            user_purpose: UserPurpose::Informational,
            data_requirements: DataRequirements::default(),
            action_verbs: vec!["weather".into()],
            is_followup: false,
        })
        .unwrap();
        doc
    }

    #[test]
    fn write_creates_all_three_artifacts() {
        let dir = tempdir().unwrap();
        let writer = TurnWriter::new(dir.path());
        let doc = sample_doc();
        let record = writer.write(&doc, TurnStatus::Partial).unwrap();

        let turn_dir = writer.archive_path(doc.turn_id);
        assert!(turn_dir.join("context.md").exists());
        assert!(turn_dir.join("claims.jsonl").exists());
        assert!(turn_dir.join("record.json").exists());
        assert_eq!(record.raw_query, "what's the weather");
    }

    #[test]
    fn load_record_round_trips() {
        let dir = tempdir().unwrap();
        let writer = TurnWriter::new(dir.path());
        let doc = sample_doc();
        writer.write(&doc, TurnStatus::Approved).unwrap();

        let loaded = writer.load_record(doc.turn_id).unwrap();
        assert_eq!(loaded.turn_id, doc.turn_id);
        assert_eq!(loaded.status, TurnStatus::Approved);
    }
}
