//! Translates the Orchestrator's internal [`TurnEvent`] stream into the
//! wire event sequence `/chat` promises callers: `turn_started`,
//! `phase_started`, `phase_completed`, `tool_invoked`,
//! `intervention_required`, `response_chunk`, `response_complete`,
//! `turn_complete`. Kept as its own module so the wire shape can evolve
//! without touching orchestration logic, same split as the teacher's
//! `factory::ws` message framing living apart from `factory::api`.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::orchestrator::{TurnEvent, TurnOutcome};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    TurnStarted { turn_id: Uuid },
    PhaseStarted { phase: &'static str },
    PhaseCompleted { phase: &'static str, duration_ms: u64 },
    ToolInvoked { name: String, status: crate::document::EntryStatus },
    InterventionRequired { id: String, intervention_type: &'static str, url: Option<String> },
    ResponseChunk { text: String },
    ResponseComplete { quality: f64, trace_id: Uuid },
    TurnComplete { id: Uuid, validation: crate::document::TurnStatus },
}

impl ChatEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| json!({"event": "error"}).to_string())
    }
}

/// Stateful translator: one per `/chat` call, tracking when each phase
/// started so `phase_completed` can carry a `duration_ms`.
pub struct EventTranslator {
    turn_id: Uuid,
    phase_started_at: HashMap<&'static str, Instant>,
    last_confidence: f64,
}

impl EventTranslator {
    pub fn new(turn_id: Uuid) -> Self {
        Self { turn_id, phase_started_at: HashMap::new(), last_confidence: 0.0 }
    }

    pub fn turn_started(&self) -> ChatEvent {
        ChatEvent::TurnStarted { turn_id: self.turn_id }
    }

    /// Maps one internal event to zero or more wire events. `PhaseStarted`
    /// produces one; `PhaseFinished` produces `phase_completed` with the
    /// elapsed time recorded at the matching `PhaseStarted`. `Finished`
    /// produces both `response_complete` and `turn_complete` since the
    /// wire contract separates "the text is final" from "the turn record
    /// is archived", a distinction the Orchestrator collapses into one
    /// terminal event.
    pub fn translate(&mut self, event: &TurnEvent) -> Vec<ChatEvent> {
        match event {
            TurnEvent::PhaseStarted { phase } => {
                self.phase_started_at.insert(phase, Instant::now());
                vec![ChatEvent::PhaseStarted { phase }]
            }
            TurnEvent::PhaseFinished { phase } => {
                let duration_ms = self
                    .phase_started_at
                    .get(phase)
                    .map(|start| start.elapsed().as_millis() as u64)
                    .unwrap_or(0);
                vec![ChatEvent::PhaseCompleted { phase, duration_ms }]
            }
            TurnEvent::ToolInvoked { name, status } => {
                vec![ChatEvent::ToolInvoked { name: name.clone(), status: *status }]
            }
            TurnEvent::Finished { status } => {
                vec![
                    ChatEvent::ResponseComplete { quality: self.last_confidence, trace_id: self.turn_id },
                    ChatEvent::TurnComplete { id: self.turn_id, validation: *status },
                ]
            }
            TurnEvent::ValidationAttempt { confidence, .. } => {
                self.last_confidence = *confidence;
                vec![]
            }
            TurnEvent::InnerLoopIteration { .. } | TurnEvent::Redirected { .. } | TurnEvent::Cancelled => vec![],
        }
    }

    pub fn response_chunk(outcome: &TurnOutcome) -> ChatEvent {
        ChatEvent::ResponseChunk { text: outcome.response_text.clone() }
    }
}
