//! Turn checkpoint log: an append-only record of which phase a turn last
//! completed, so a crashed process can report where a turn got to. Adapted
//! from the teacher's pipe-delimited `StateManager` log, keyed by turn id
//! instead of phase number.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CheckpointEntry {
    pub turn_id: Uuid,
    pub phase: String,
    pub at: DateTime<Utc>,
}

pub struct CheckpointLog {
    path: PathBuf,
}

impl CheckpointLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Appends one line: `turn_id|phase|timestamp`.
    pub fn record(&self, turn_id: Uuid, phase: &str) -> Result<()> {
        let line = format!("{}|{}|{}\n", turn_id, phase, Utc::now().to_rfc3339());
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("failed to open checkpoint log")?
            .write_all(line.as_bytes())
            .context("failed to append checkpoint entry")?;
        Ok(())
    }

    /// The last phase recorded for `turn_id`, if any — used to report how
    /// far a crashed turn got.
    pub fn last_phase(&self, turn_id: Uuid) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).context("failed to read checkpoint log")?;
        let needle = turn_id.to_string();
        Ok(content
            .lines()
            .filter(|line| line.starts_with(&needle))
            .next_back()
            .and_then(|line| line.split('|').nth(1))
            .map(|s| s.to_string()))
    }

    pub fn entries(&self) -> Result<Vec<CheckpointEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).context("failed to read checkpoint log")?;
        Ok(content
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('|').collect();
                if parts.len() != 3 {
                    return None;
                }
                Some(CheckpointEntry {
                    turn_id: parts[0].parse().ok()?,
                    phase: parts[1].to_string(),
                    at: DateTime::parse_from_rfc3339(parts[2]).ok()?.with_timezone(&Utc),
                })
            })
            .collect())
    }
}
