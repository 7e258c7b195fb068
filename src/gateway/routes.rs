//! Request handlers and router assembly. Grounded on the teacher's
//! `factory::api` module: same `api_router() -> Router<SharedState>`
//! shape, same `ApiError` → `StatusCode` mapping, same flat handler
//! functions rather than a framework-generated CRUD layer.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::gateway::sse::EventTranslator;
use crate::gateway::{parse_mode, SharedState};
use crate::injection::InjectionMessage;
use crate::orchestrator::TurnEvent;

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/inject", post(inject))
        .route("/intervention/{id}/resolve", post(resolve_intervention))
        .route("/healthz", get(healthz))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    session_id: String,
    mode: String,
    #[allow(dead_code)]
    user_id: Option<String>,
}

/// Starts a new turn for `session_id` and streams its progress as SSE.
/// If the session already has an active turn, the message is routed
/// through the Injection Manager instead of starting a second turn —
/// the mirror image of the fallback `/inject`'s own doc comment
/// describes for the no-active-turn case.
async fn chat(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<ReceiverStream<Result<Event, Infallible>>>, ApiError> {
    let mode = parse_mode(&req.mode).ok_or_else(|| ApiError::BadRequest(format!("unknown mode '{}'", req.mode)))?;

    let (tx, rx) = mpsc::channel(64);

    if state.sessions.has_active_turn(&req.session_id) {
        state.injections.submit(&req.session_id, InjectionMessage::Redirect(req.message));
        drop(tx);
        return Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()));
    }

    let turn_id = Uuid::new_v4();
    state.sessions.begin_turn(&req.session_id, mode, turn_id);
    let conversation_buffer = state.sessions.conversation_buffer(&req.session_id);
    let subscriber = state.events.subscribe();

    let session_id = req.session_id.clone();
    let message = req.message.clone();
    let state_for_turn = state.clone();
    tokio::spawn(async move {
        let ctx = state_for_turn.engine.phase_context();
        let external = state_for_turn.engine.external_candidates();
        let orchestrator = state_for_turn.orchestrator(&ctx);
        let outcome = orchestrator.run_turn(turn_id, &session_id, mode, &message, &conversation_buffer, external).await;
        match outcome {
            Ok(outcome) => state_for_turn.sessions.end_turn(&session_id, &message, &outcome.response_text),
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "turn failed before reaching save");
                state_for_turn.sessions.end_turn(&session_id, &message, "");
            }
        }
    });

    tokio::spawn(forward_turn_events(turn_id, subscriber, tx));

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// Drains `subscriber` until the matching turn's `Finished` event (or the
/// channel closes), translating each internal event into zero or more
/// wire events and pushing them to `tx`. Runs as its own task so a slow
/// SSE consumer backpressures through `tx`'s bounded channel rather than
/// blocking the Orchestrator, which publishes to `events` regardless of
/// whether anyone is listening.
async fn forward_turn_events(
    turn_id: Uuid,
    mut subscriber: broadcast::Receiver<TurnEvent>,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    let mut translator = EventTranslator::new(turn_id);
    let _ = tx.send(Ok(Event::default().data(translator.turn_started().to_sse_data()))).await;

    loop {
        match subscriber.recv().await {
            Ok(event) => {
                let is_finished = matches!(event, TurnEvent::Finished { .. });
                for wire_event in translator.translate(&event) {
                    if tx.send(Ok(Event::default().data(wire_event.to_sse_data()))).await.is_err() {
                        return;
                    }
                }
                if is_finished {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[derive(Deserialize)]
struct InjectRequest {
    session_id: String,
    message: String,
}

#[derive(Serialize)]
struct InjectResponse {
    enqueued: bool,
}

/// `{session_id, message}` — if an active turn exists, enqueued as a
/// redirect; otherwise `enqueued=false` and the caller should retry via
/// `/chat` to start a fresh turn, per the wire contract's fallback.
async fn inject(State(state): State<SharedState>, Json(req): Json<InjectRequest>) -> Json<InjectResponse> {
    let enqueued = state.injections.submit(&req.session_id, InjectionMessage::Redirect(req.message));
    Json(InjectResponse { enqueued })
}

#[derive(Deserialize)]
struct ResolveInterventionRequest {
    solved: bool,
}

async fn resolve_intervention(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<ResolveInterventionRequest>,
) -> Result<StatusCode, ApiError> {
    if state.interventions.resolve(&id, req.solved) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no pending intervention '{id}'")))
    }
}

/// Tracks paused turns waiting on an out-of-band resolution (CAPTCHA,
/// login wall, a code-mode write outside the repository root). Nothing in
/// this tree's tool layer raises one yet — `ToolError` has no variant for
/// it — but the registry and endpoint exist per the wire contract so a
/// future tool can register a pending id without a Gateway change.
#[derive(Default)]
pub struct InterventionRegistry {
    pending: Mutex<HashMap<String, bool>>,
}

impl InterventionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>) {
        self.pending.lock().unwrap().insert(id.into(), false);
    }

    pub fn resolve(&self, id: &str, solved: bool) -> bool {
        let mut pending = self.pending.lock().unwrap();
        pending.remove(id).map(|_| solved).is_some()
    }
}
