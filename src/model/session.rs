use serde::{Deserialize, Serialize};

use crate::common::Vars;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    /// The graph owns the conversation.
    #[default]
    Bot,
    /// Handed to a queue, no agent yet.
    Waiting,
    /// An agent picked it up.
    Open,
    Closed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sender {
    Bot,
    User,
    Agent,
    System,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<Button>>,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HaltKind {
    /// Dangling edge, missing anchor, ambiguous handle. Also a failed
    /// outbound call with no `error` edge.
    GraphIntegrity,
    Script,
    /// Condition without a match and without an else route.
    Unmatched,
    /// Step budget ran out.
    StepBudget,
}

/// Why the last turn stopped short, and where.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Halt {
    pub node_id: String,
    pub kind: HaltKind,
    pub message: String,
    /// The next user message re-runs `node_id`.
    pub retryable: bool,
}

/// One customer conversation.
///
/// `current_node_id` is set exactly while the graph waits on an `input` or
/// `template` node. `pending_node_id` is the node a running turn executes
/// next and is cleared when the turn ends, so a non-empty value after a
/// restart means the turn died midway.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: String,
    pub flow_id: String,
    /// published version the session last ran on
    pub flow_version: u64,
    pub status: SessionStatus,
    pub variables: Vars,
    pub messages: Vec<ChatMessage>,
    pub current_node_id: Option<String>,
    pub pending_node_id: Option<String>,
    pub queue: Option<String>,
    pub agent_id: Option<String>,
    pub halt: Option<Halt>,
    pub create_time: i64,
    pub update_time: i64,
}

impl Session {
    pub fn new(
        id: String,
        flow_id: String,
        flow_version: u64,
        now: i64,
    ) -> Self {
        Self {
            id,
            flow_id,
            flow_version,
            create_time: now,
            update_time: now,
            ..Default::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == SessionStatus::Closed
    }

    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Bot && self.current_node_id.is_some()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
