//! Progress events the Orchestrator emits as it drives a turn, consumed by
//! the Gateway's SSE stream.

use serde::Serialize;

use crate::document::{Decision, EntryStatus, TurnStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    PhaseStarted { phase: &'static str },
    PhaseFinished { phase: &'static str },
    InnerLoopIteration { iteration: u32 },
    ToolInvoked { name: String, status: EntryStatus },
    ValidationAttempt { attempt: u32, decision: Decision, confidence: f64 },
    Redirected { note: String },
    Cancelled,
    Finished { status: TurnStatus },
}
