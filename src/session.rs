//! Per-session state: the rolling conversation buffer Phase 1 resolves
//! pronouns against, and which mode + turn (if any) is currently active.
//! One `Session` per `session_id`; the Gateway owns the registry and
//! decides whether an inbound `/chat` call starts a new turn or whether
//! the session already has one in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::document::Mode;

/// How many prior turns' resolved queries stay in the rolling buffer that
/// Phase 1 sees. Mirrors the bound the teacher places on its own
/// transcript window so pronoun resolution never pulls in the whole
/// session history.
const CONVERSATION_BUFFER_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub mode: Mode,
    pub active_turn: Option<uuid::Uuid>,
    buffer: VecDeque<String>,
}

impl Session {
    fn new(session_id: impl Into<String>, mode: Mode) -> Self {
        Self { session_id: session_id.into(), mode, active_turn: None, buffer: VecDeque::new() }
    }

    pub fn conversation_buffer(&self) -> Vec<String> {
        self.buffer.iter().cloned().collect()
    }

    fn record_turn(&mut self, resolved_query: &str, response_text: &str) {
        self.buffer.push_back(format!("user: {resolved_query}"));
        self.buffer.push_back(format!("assistant: {response_text}"));
        while self.buffer.len() > CONVERSATION_BUFFER_DEPTH * 2 {
            self.buffer.pop_front();
        }
    }
}

/// Registry of live sessions. Separate from [`crate::injection::InjectionManager`]
/// — that tracks mid-turn interruption channels, this tracks conversational
/// state that outlives any single turn.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `session_id` has a turn currently in flight. The Gateway
    /// uses this to decide whether an incoming message should start a new
    /// turn or be routed through the Injection Manager instead.
    pub fn has_active_turn(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|s| s.active_turn.is_some())
            .unwrap_or(false)
    }

    pub fn conversation_buffer(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|s| s.conversation_buffer())
            .unwrap_or_default()
    }

    /// Marks a turn as starting for `session_id`, creating the session if
    /// this is its first message. `mode` is re-stamped on every turn since
    /// a session may switch between chat and code across turns.
    pub fn begin_turn(&self, session_id: &str, mode: Mode, turn_id: uuid::Uuid) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| Session::new(session_id, mode));
        session.mode = mode;
        session.active_turn = Some(turn_id);
    }

    /// Clears the active turn and appends it to the rolling buffer.
    /// Always called when a turn terminates, regardless of outcome.
    pub fn end_turn(&self, session_id: &str, resolved_query: &str, response_text: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.active_turn = None;
            session.record_turn(resolved_query, response_text);
        }
    }
}
