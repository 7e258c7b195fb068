//! Phase 8 — Save: archives the finished turn and indexes it for future
//! recall by Phase 2.1. Terminal phase; commits §8 once the archive and
//! index write both succeed.

use tracing::instrument;

use crate::document::{ContextDocument, SaveRecord, TurnStatus};
use crate::errors::PhaseError;
use crate::phases::PhaseContext;

/// Archives and indexes `doc` under the given terminal `status`. The
/// Orchestrator picks `status` — it is the only thing that knows whether
/// a RETRY/REVISE cap, a mid-turn cancel, or a §1.5 CLARIFY drove the turn
/// to its end, so this phase does not re-derive it from a `Decision`.
#[instrument(skip(ctx, doc))]
pub async fn run(ctx: &PhaseContext<'_>, doc: &mut ContextDocument, status: TurnStatus) -> Result<SaveRecord, PhaseError> {
    let record = ctx.turn_writer.write(doc, status)?;
    ctx.turn_index.append(&record)?;

    let save_record = SaveRecord {
        turn_id: doc.turn_id,
        timestamp: record.finished_at,
        archive_path: ctx.turn_writer.archive_path(doc.turn_id).display().to_string(),
        index_entries_written: vec![record.turn_id.to_string()],
    };

    doc.commit_section_8(save_record.clone())?;
    Ok(save_record)
}
