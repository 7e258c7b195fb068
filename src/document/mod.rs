//! The append-only per-turn [`ContextDocument`].
//!
//! Sole state carrier across phases. Each `commit_*` method enforces the
//! data model's ordering invariants: a phase cannot commit a § until every
//! § it declares as input already exists, and no § can be committed twice.
//! Mutating access in the Orchestrator is always sequential within a turn
//! (see the concurrency model), so this type needs no internal locking.

pub mod types;

pub use types::*;

use crate::errors::DocumentError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `chat` is read-only; `code` additionally permits mutating tools scoped
/// to a repository root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Chat,
    Code,
}

impl Mode {
    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code)
    }
}

/// One turn's append-only document. Fields are `Option` until their
/// owning phase commits them; `§5` is reserved and has no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDocument {
    pub turn_id: Uuid,
    pub session_id: String,
    pub mode: Mode,
    pub started_at: chrono::DateTime<Utc>,

    section_0: Option<QuerySection>,
    section_1: Option<QueryValidation>,
    section_2: Option<ContextBundle>,
    section_2_committed: bool,
    section_3: Option<StrategicPlan>,
    section_4: ExecutionLog,
    section_6: Option<SynthesisDraft>,
    section_7: ValidationRecord,
    section_8: Option<SaveRecord>,
}

impl ContextDocument {
    pub fn new(session_id: impl Into<String>, mode: Mode) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            session_id: session_id.into(),
            mode,
            started_at: Utc::now(),
            section_0: None,
            section_1: None,
            section_2: None,
            section_2_committed: false,
            section_3: None,
            section_4: ExecutionLog::default(),
            section_6: None,
            section_7: ValidationRecord::default(),
            section_8: None,
        }
    }

    /// Same as [`Self::new`] but with a caller-supplied `turn_id`, so the
    /// Gateway can hand out an id before the turn starts (for SSE framing
    /// and session bookkeeping) and have the archived document agree with
    /// it instead of minting its own.
    pub fn with_turn_id(turn_id: Uuid, session_id: impl Into<String>, mode: Mode) -> Self {
        Self { turn_id, ..Self::new(session_id, mode) }
    }

    pub fn section_0(&self) -> Option<&QuerySection> {
        self.section_0.as_ref()
    }

    pub fn commit_section_0(&mut self, section: QuerySection) -> Result<(), DocumentError> {
        if self.section_0.is_some() {
            return Err(DocumentError::AlreadyCommitted { section: "§0" });
        }
        self.section_0 = Some(section);
        Ok(())
    }

    pub fn section_1(&self) -> Option<&QueryValidation> {
        self.section_1.as_ref()
    }

    pub fn commit_section_1(&mut self, section: QueryValidation) -> Result<(), DocumentError> {
        self.require_committed("phase_1_5", "§0", self.section_0.is_some())?;
        if self.section_1.is_some() {
            return Err(DocumentError::AlreadyCommitted { section: "§1" });
        }
        self.section_1 = Some(section);
        Ok(())
    }

    pub fn section_2(&self) -> Option<&ContextBundle> {
        if self.section_2_committed {
            self.section_2.as_ref()
        } else {
            None
        }
    }

    /// §2.2's draft, visible before §2.5 has approved it (so the validator
    /// itself can read the draft it is gating).
    pub fn section_2_draft(&self) -> Option<&ContextBundle> {
        self.section_2.as_ref()
    }

    pub fn write_section_2_draft(&mut self, bundle: ContextBundle) -> Result<(), DocumentError> {
        self.require_committed("phase_2_2", "§0", self.section_0.is_some())?;
        if self.section_2_committed {
            return Err(DocumentError::AlreadyCommitted { section: "§2" });
        }
        self.section_2 = Some(bundle);
        Ok(())
    }

    /// Commits the current §2 draft. Only phase 2.5 (the context
    /// validator) may call this, and only after it has passed the draft.
    pub fn commit_section_2(&mut self) -> Result<(), DocumentError> {
        if self.section_2.is_none() {
            return Err(DocumentError::MissingSection {
                phase: "phase_2_5",
                section: "§2 draft",
            });
        }
        if self.section_2_committed {
            return Err(DocumentError::AlreadyCommitted { section: "§2" });
        }
        self.section_2_committed = true;
        Ok(())
    }

    pub fn section_3(&self) -> Option<&StrategicPlan> {
        self.section_3.as_ref()
    }

    /// Writes §3. Unlike most sections this one is written fresh on every
    /// planner invocation (including replans); the revision number inside
    /// `StrategicPlan` is what records history, not append-only storage.
    pub fn write_section_3(&mut self, plan: StrategicPlan) -> Result<(), DocumentError> {
        self.require_committed("phase_3", "§2", self.section_2_committed)?;
        self.section_3 = Some(plan);
        Ok(())
    }

    pub fn section_4(&self) -> &ExecutionLog {
        &self.section_4
    }

    /// Appends one §4 entry. Never truncates — the only way §4 shrinks is
    /// that it never does.
    pub fn append_section_4(&mut self, entry: ExecutionEntry) -> Result<(), DocumentError> {
        self.require_committed("phase_4_5", "§3", self.section_3.is_some())?;
        self.section_4.entries.push(entry);
        Ok(())
    }

    /// Records a RETRY loop-back without touching existing §4 entries.
    pub fn record_revision(&mut self, marker: RevisionMarker) {
        self.section_4.revision_markers.push(marker);
    }

    pub fn section_6(&self) -> Option<&SynthesisDraft> {
        self.section_6.as_ref()
    }

    /// Writes §6. Like §3, this is rewritten on every REVISE; the attempt
    /// history lives in §7, not in §6 itself.
    pub fn write_section_6(&mut self, draft: SynthesisDraft) -> Result<(), DocumentError> {
        self.require_committed("phase_6", "§0", self.section_0.is_some())?;
        self.section_6 = Some(draft);
        Ok(())
    }

    pub fn section_7(&self) -> &ValidationRecord {
        &self.section_7
    }

    /// Appends one validation attempt. §7 accumulates; it is never
    /// overwritten.
    pub fn append_section_7(&mut self, attempt: ValidationAttempt) -> Result<(), DocumentError> {
        self.require_committed("phase_7", "§6", self.section_6.is_some())?;
        self.section_7.attempts.push(attempt);
        Ok(())
    }

    pub fn section_8(&self) -> Option<&SaveRecord> {
        self.section_8.as_ref()
    }

    pub fn commit_section_8(&mut self, record: SaveRecord) -> Result<(), DocumentError> {
        if self.section_7.attempts.is_empty() {
            return Err(DocumentError::MissingSection {
                phase: "phase_8",
                section: "§7",
            });
        }
        if self.section_8.is_some() {
            return Err(DocumentError::AlreadyCommitted { section: "§8" });
        }
        self.section_8 = Some(record);
        Ok(())
    }

    fn require_committed(
        &self,
        phase: &'static str,
        section: &'static str,
        present: bool,
    ) -> Result<(), DocumentError> {
        if present {
            Ok(())
        } else {
            Err(DocumentError::MissingSection { phase, section })
        }
    }

    /// Renders `context.md`: the full §0–§8 document in the persisted
    /// turn layout.
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Turn {}\n\n", self.turn_id));
        if let Some(q) = &self.section_0 {
            out.push_str(&format!(
                "## §0 Query\n\nraw: {}\nresolved: {}\npurpose: {:?}\n\n",
                q.raw_query, q.resolved_query, q.user_purpose
            ));
        }
        if let Some(v) = &self.section_1 {
            out.push_str(&format!("## §1 Query Validation\n\n{:?}\n\n", v.decision));
        }
        if let Some(c) = self.section_2() {
            out.push_str(&format!("## §2 Context\n\n{} items\n\n", c.items.len()));
        }
        if let Some(p) = &self.section_3 {
            out.push_str(&format!(
                "## §3 Plan (rev {})\n\n{} goals, route {:?}\n\n",
                p.revision,
                p.goals.len(),
                p.route
            ));
        }
        out.push_str(&format!(
            "## §4 Execution Log\n\n{} entries, {} revision markers\n\n",
            self.section_4.entries.len(),
            self.section_4.revision_markers.len()
        ));
        if let Some(d) = &self.section_6 {
            out.push_str(&format!("## §6 Response\n\n{}\n\n", d.text));
        }
        out.push_str(&format!(
            "## §7 Validation\n\n{} attempts\n\n",
            self.section_7.attempts.len()
        ));
        if let Some(s) = &self.section_8 {
            out.push_str(&format!("## §8 Save\n\narchived to {}\n", s.archive_path));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query() -> QuerySection {
        QuerySection {
            raw_query: "hello".into(),
            resolved_query: "hello".into(),
            user_purpose: UserPurpose::Trivial,
            data_requirements: DataRequirements::default(),
            action_verbs: vec![],
            is_followup: false,
        }
    }

    #[test]
    fn section_2_cannot_be_committed_twice() {
        let mut doc = ContextDocument::new("s1", Mode::Chat);
        doc.commit_section_0(sample_query()).unwrap();
        doc.write_section_2_draft(ContextBundle::default()).unwrap();
        doc.commit_section_2().unwrap();
        let err = doc.commit_section_2().unwrap_err();
        assert!(matches!(err, DocumentError::AlreadyCommitted { section: "§2" }));
    }

    #[test]
    fn section_3_requires_committed_section_2() {
        let mut doc = ContextDocument::new("s1", Mode::Chat);
        doc.commit_section_0(sample_query()).unwrap();
        let err = doc
            .write_section_3(StrategicPlan {
                goals: vec![],
                approach: "x".into(),
                route: Route::Synthesis,
                success_criteria: vec![],
                workpad: None,
                revision: 0,
            })
            .unwrap_err();
        assert!(matches!(err, DocumentError::MissingSection { section: "§2", .. }));
    }

    #[test]
    fn section_4_append_never_truncates() {
        let mut doc = ContextDocument::new("s1", Mode::Chat);
        doc.commit_section_0(sample_query()).unwrap();
        doc.write_section_2_draft(ContextBundle::default()).unwrap();
        doc.commit_section_2().unwrap();
        doc.write_section_3(StrategicPlan {
            goals: vec![],
            approach: "x".into(),
            route: Route::Executor,
            success_criteria: vec![],
            workpad: None,
            revision: 0,
        })
        .unwrap();
        for i in 0..3 {
            doc.append_section_4(ExecutionEntry {
                iteration: i,
                executor_command: "do thing".into(),
                invocation: Invocation::Blocked { reason: "test".into() },
                raw_result: serde_json::json!({}),
                claims: vec![],
                status: EntryStatus::Blocked,
            })
            .unwrap();
        }
        doc.record_revision(RevisionMarker {
            attempt: 1,
            from_phase: "phase_7",
            reason_tags: vec![RetryReason::ToolFailure],
            at: Utc::now(),
        });
        assert_eq!(doc.section_4().entries.len(), 3);
        assert_eq!(doc.section_4().revision_markers.len(), 1);
    }

    #[test]
    fn section_8_requires_at_least_one_validation_attempt() {
        let mut doc = ContextDocument::new("s1", Mode::Chat);
        let err = doc
            .commit_section_8(SaveRecord {
                turn_id: doc.turn_id,
                timestamp: Utc::now(),
                archive_path: "x".into(),
                index_entries_written: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, DocumentError::MissingSection { section: "§7", .. }));
    }

    #[test]
    fn best_seen_tracks_highest_confidence_attempt() {
        let mut record = ValidationRecord::default();
        record.attempts.push(ValidationAttempt {
            attempt: 1,
            decision: Decision::Retry,
            confidence: 0.4,
            checks: ValidationChecks::default(),
            issues: vec![],
            revision_hints: vec![],
            suggested_fixes: None,
            reason_tags: vec![],
        });
        record.attempts.push(ValidationAttempt {
            attempt: 2,
            decision: Decision::Fail,
            confidence: 0.6,
            checks: ValidationChecks::default(),
            issues: vec![],
            revision_hints: vec![],
            suggested_fixes: None,
            reason_tags: vec![],
        });
        assert_eq!(record.best_seen().unwrap().attempt, 2);
    }
}
