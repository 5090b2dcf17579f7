#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started,
    /// Waiting on an input or template node.
    Paused,
    Resumed,
    /// Handed to the named queue.
    Handoff(String),
    Closed,
    /// Turn stopped on a diagnostic.
    Halted(String),
    /// Traversal reached a node with no way forward.
    Ended,
}

impl SessionEvent {
    pub fn str(&self) -> &str {
        match self {
            SessionEvent::Started => "Started",
            SessionEvent::Paused => "Paused",
            SessionEvent::Resumed => "Resumed",
            SessionEvent::Handoff(_) => "Handoff",
            SessionEvent::Closed => "Closed",
            SessionEvent::Halted(_) => "Halted",
            SessionEvent::Ended => "Ended",
        }
    }
}
