#[derive(Debug, Clone)]
pub enum NodeEvent {
    Running(i64),
    Succeeded(i64),
    /// The turn was aborted while the node ran.
    Stopped(i64),
    Error(String),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "Running",
            NodeEvent::Succeeded(_) => "Succeeded",
            NodeEvent::Stopped(_) => "Stopped",
            NodeEvent::Error(_) => "Error",
        }
    }
}
