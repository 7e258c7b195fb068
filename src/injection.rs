//! Injection Manager: the mid-turn channel that lets a user cancel or
//! redirect an in-flight turn. One entry per active session; the Gateway's
//! `/inject` route writes into it, the Orchestrator drains it at every
//! checkpoint (before an LLM call, before a tool invocation, between inner-
//! loop iterations). Session state is always released when the turn ends,
//! whether by success, cancel, or error.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One message submitted via the `/inject` route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionMessage {
    Cancel,
    Redirect(String),
    AddContext(String),
}

/// What a checkpoint drain found, categorized for the Orchestrator.
#[derive(Debug, Clone, Default)]
pub struct InjectionDrain {
    pub cancelled: bool,
    pub redirects: Vec<String>,
    pub added_context: Vec<String>,
}

impl InjectionDrain {
    pub fn is_empty(&self) -> bool {
        !self.cancelled && self.redirects.is_empty() && self.added_context.is_empty()
    }
}

struct SessionInjection {
    cancel: AtomicBool,
    queue: Mutex<VecDeque<InjectionMessage>>,
}

impl SessionInjection {
    fn new() -> Self {
        Self { cancel: AtomicBool::new(false), queue: Mutex::new(VecDeque::new()) }
    }
}

/// Per-process registry of in-flight sessions' injection state.
#[derive(Default)]
pub struct InjectionManager {
    sessions: Mutex<HashMap<String, SessionInjection>>,
}

impl InjectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a slot for `session_id`'s active turn. Call once at turn start.
    pub fn register(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session_id.to_string(), SessionInjection::new());
    }

    /// Whether `session_id` currently has an active turn registered.
    pub fn has_active_turn(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    /// Routes a message from the `/inject` HTTP handler to the active
    /// turn's queue. Returns `false` if no turn is active for the session,
    /// in which case the Gateway should treat the request as a new turn
    /// instead.
    pub fn submit(&self, session_id: &str, message: InjectionMessage) -> bool {
        let sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get(session_id) else {
            return false;
        };
        if matches!(message, InjectionMessage::Cancel) {
            session.cancel.store(true, Ordering::SeqCst);
        }
        session.queue.lock().unwrap().push_back(message);
        true
    }

    /// Drains everything queued since the last checkpoint, categorized.
    /// Iteration counters are never reset by a drain — the Orchestrator
    /// owns that bookkeeping.
    pub fn checkpoint(&self, session_id: &str) -> InjectionDrain {
        let sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get(session_id) else {
            return InjectionDrain::default();
        };
        let mut drain = InjectionDrain { cancelled: session.cancel.load(Ordering::SeqCst), ..Default::default() };
        let mut queue = session.queue.lock().unwrap();
        while let Some(message) = queue.pop_front() {
            match message {
                InjectionMessage::Cancel => drain.cancelled = true,
                InjectionMessage::Redirect(text) => drain.redirects.push(text),
                InjectionMessage::AddContext(text) => drain.added_context.push(text),
            }
        }
        drain
    }

    /// Releases `session_id`'s slot. Always called when a turn terminates.
    pub fn release(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_before_register_is_a_no_op() {
        let mgr = InjectionManager::new();
        assert!(!mgr.submit("s1", InjectionMessage::Cancel));
    }

    #[test]
    fn checkpoint_drains_redirects_and_context_without_clearing_cancel() {
        let mgr = InjectionManager::new();
        mgr.register("s1");
        mgr.submit("s1", InjectionMessage::Redirect("focus on Lenovo only".into()));
        mgr.submit("s1", InjectionMessage::AddContext("budget is now $1500".into()));

        let drain = mgr.checkpoint("s1");
        assert!(!drain.cancelled);
        assert_eq!(drain.redirects, vec!["focus on Lenovo only".to_string()]);
        assert_eq!(drain.added_context, vec!["budget is now $1500".to_string()]);

        let second = mgr.checkpoint("s1");
        assert!(second.is_empty());
    }

    #[test]
    fn cancel_sticks_across_checkpoints_until_release() {
        let mgr = InjectionManager::new();
        mgr.register("s1");
        mgr.submit("s1", InjectionMessage::Cancel);

        assert!(mgr.checkpoint("s1").cancelled);
        assert!(mgr.checkpoint("s1").cancelled);

        mgr.release("s1");
        assert!(!mgr.has_active_turn("s1"));
    }
}
