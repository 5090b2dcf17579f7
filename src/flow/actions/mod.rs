//! Node actions.
//!
//! Every node kind is backed by an [`Action`]. `run` executes the node when
//! traversal reaches it; pause points (`input`, `template`) also implement
//! `resume`, called with the customer's reply.

mod anchor;
mod condition;
mod delay;
mod end;
mod goto;
pub mod http_request;
mod input;
mod message;
mod queue;
mod schedule;
mod script;
mod set_value;
mod start;
mod template;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Button, ChatflowError, Result,
    flow::{
        edge::SourceHandle,
        node::{NodeId, NodeKind},
    },
    runtime::Context,
};

pub use anchor::AnchorAction;
pub use condition::ConditionAction;
pub use delay::DelayAction;
pub use end::EndAction;
pub use goto::GotoAction;
pub use http_request::HttpRequestAction;
pub use input::InputAction;
pub use message::MessageAction;
pub use queue::QueueAction;
pub use schedule::ScheduleAction;
pub use script::ScriptAction;
pub use set_value::SetValueAction;
pub use start::StartAction;
pub use template::TemplateAction;

/// Validate `params` against the action schema and decode it.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    schema: &serde_json::Value,
    params: serde_json::Value,
) -> Result<T> {
    jsonschema::validate(schema, &params)?;
    Ok(serde_json::from_value::<T>(params)?)
}

#[async_trait]
pub trait Action: Send + Sync {
    /// Creates a new instance of the action from the node data.
    ///
    /// # Arguments
    ///
    /// * `params` - The [`serde_json::Value`] holding the node's `data`.
    ///
    /// # Returns
    ///
    /// Returns a [`Result`] containing the created action instance.
    fn create(params: serde_json::Value) -> Result<Self>
    where
        Self: Sized;

    /// Returns the JSON schema the node data must satisfy.
    fn schema() -> serde_json::Value
    where
        Self: Sized;

    /// Returns the node kind the action runs for.
    fn action_type(&self) -> NodeKind;

    /// Executes the node.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The [`Context`] of the running turn.
    /// * `nid` - The id of the node.
    async fn run(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
    ) -> Result<ActionOutput>;

    /// Continues a node the session is paused on.
    async fn resume(
        &self,
        _ctx: Arc<Context>,
        nid: NodeId,
        _event: ResumeEvent,
    ) -> Result<ActionOutput> {
        Err(ChatflowError::Session(format!("node '{}' ({}) does not wait for a reply", nid, self.action_type().as_ref())))
    }
}

/// Customer reply delivered to a paused node.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeEvent {
    UserText(String),
    ButtonClick {
        id: String,
        label: String,
    },
}

/// Message the bot sends while running a node.
#[derive(Debug, Clone, PartialEq)]
pub struct BotMessage {
    pub text: String,
    pub buttons: Option<Vec<Button>>,
}

impl BotMessage {
    pub fn text(text: String) -> Self {
        Self {
            text,
            buttons: None,
        }
    }
}

/// Where traversal goes after a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Follow `handle` if such an edge exists, otherwise end the turn quietly.
    Next(SourceHandle),
    /// Follow `handle`, a missing edge is an integrity error.
    Branch(SourceHandle),
    /// Follow the default edge or, failing that, the only outgoing edge.
    Only,
    /// Continue at a node, wherever it is.
    Jump(NodeId),
    /// Wait for the customer.
    Pause,
    /// Hand the session to a human queue.
    Handoff {
        queue: String,
        reason: Option<String>,
    },
    /// Close the session.
    Close,
    /// No rule matched and there is nowhere to go. The session is stuck.
    Unmatched(String),
}

/// Output returned by an action.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    /// bot messages, in order
    pub messages: Vec<BotMessage>,
    pub transition: Transition,
}

impl ActionOutput {
    pub fn new(transition: Transition) -> Self {
        Self {
            messages: Vec::new(),
            transition,
        }
    }

    /// Continue through the default handle.
    pub fn next() -> Self {
        Self::new(Transition::Next(SourceHandle::default()))
    }

    pub fn branch(handle: SourceHandle) -> Self {
        Self::new(Transition::Branch(handle))
    }

    pub fn with_message(
        mut self,
        message: BotMessage,
    ) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_text(
        self,
        text: String,
    ) -> Self {
        self.with_message(BotMessage::text(text))
    }
}
