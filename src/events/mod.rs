//! Event types for chat sessions.
//!
//! Events are emitted while a session turn runs, so that subscribers can follow
//! node execution, pauses, handoffs, halts and closes.

mod node;
mod session;

pub use node::*;
pub use session::*;

use crate::flow::node::NodeId;

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Session-level events (started, paused, closed, etc.).
    Session(SessionEvent),
    /// Node-level events (running, succeeded, error, etc.).
    Node(NodeEvent),
}

/// Event message with its session and node.
#[derive(Debug, Clone)]
pub struct Message {
    /// Session that generated this event.
    pub sid: String,
    /// Node that generated this event (empty for some session events).
    pub nid: NodeId,
    pub event: ChatEvent,
}

/// Log line emitted by an action.
#[derive(Debug, Clone)]
pub struct Log {
    pub sid: String,
    pub nid: NodeId,
    pub content: String,
    /// milliseconds
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl ChatEvent {
    /// The graph no longer owns the session.
    pub fn is_complete(&self) -> bool {
        matches!(self, ChatEvent::Session(SessionEvent::Handoff(_) | SessionEvent::Closed))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ChatEvent::Session(SessionEvent::Halted(_)))
    }

    /// Event name as persisted.
    pub fn name(&self) -> String {
        match self {
            ChatEvent::Session(e) => format!("Session{}", e.str()),
            ChatEvent::Node(n) => format!("Node{}", n.str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let closed = ChatEvent::Session(SessionEvent::Closed);
        assert!(closed.is_complete());
        assert_eq!(closed.name(), "SessionClosed");

        let handoff = ChatEvent::Session(SessionEvent::Handoff("suporte".to_string()));
        assert!(handoff.is_complete());

        let halted = ChatEvent::Session(SessionEvent::Halted("boom".to_string()));
        assert!(halted.is_error());
        assert!(!halted.is_complete());

        assert_eq!(ChatEvent::Node(NodeEvent::Running(1)).name(), "NodeRunning");
    }
}
