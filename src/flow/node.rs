use serde::{Deserialize, Serialize};

use crate::{
    ChatflowError, Result,
    flow::actions::{
        Action, AnchorAction, ConditionAction, DelayAction, EndAction, GotoAction, HttpRequestAction, InputAction, MessageAction, QueueAction,
        ScheduleAction, ScriptAction, SetValueAction, StartAction, TemplateAction,
    },
};

/// node id
pub type NodeId = String;

/// Closed set of node kinds a flow may contain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum NodeKind {
    Start,
    Message,
    Input,
    SetValue,
    Condition,
    Script,
    HttpRequest,
    Delay,
    Anchor,
    Goto,
    #[strum(to_string = "queue", serialize = "queueNode")]
    Queue,
    Schedule,
    Template,
    Final,
    End,
    /// Label-only branch holder, folded away when the graph is compiled.
    #[strum(to_string = "case", serialize = "caseNode")]
    Case,
}

/// Executable node of a compiled flow.
pub struct Node {
    /// node id
    pub id: NodeId,
    /// node kind
    pub kind: NodeKind,
    /// raw node data, kept for inspection
    pub data: serde_json::Value,
    /// node action
    pub action: Box<dyn Action>,
}

impl std::fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Node").field("id", &self.id).field("kind", &self.kind).finish()
    }
}

impl Node {
    pub fn new(
        id: NodeId,
        kind: NodeKind,
        data: serde_json::Value,
    ) -> Result<Self> {
        let action = Self::create_action(kind, data.clone()).map_err(|e| ChatflowError::Node(format!("node '{}' ({}): {}", id, kind.as_ref(), e)))?;

        Ok(Self {
            id,
            kind,
            data,
            action,
        })
    }

    fn create_action(
        kind: NodeKind,
        data: serde_json::Value,
    ) -> Result<Box<dyn Action>> {
        // missing data reads as an empty object
        let data = if data.is_null() {
            serde_json::json!({})
        } else {
            data
        };
        match kind {
            NodeKind::Start => Ok(Box::new(StartAction::create(data)?)),
            NodeKind::Message => Ok(Box::new(MessageAction::create(data)?)),
            NodeKind::Input => Ok(Box::new(InputAction::create(data)?)),
            NodeKind::SetValue => Ok(Box::new(SetValueAction::create(data)?)),
            NodeKind::Condition => Ok(Box::new(ConditionAction::create(data)?)),
            NodeKind::Script => Ok(Box::new(ScriptAction::create(data)?)),
            NodeKind::HttpRequest => Ok(Box::new(HttpRequestAction::create(data)?)),
            NodeKind::Delay => Ok(Box::new(DelayAction::create(data)?)),
            NodeKind::Anchor => Ok(Box::new(AnchorAction::create(data)?)),
            NodeKind::Goto => Ok(Box::new(GotoAction::create(data)?)),
            NodeKind::Queue => Ok(Box::new(QueueAction::create(data)?)),
            NodeKind::Schedule => Ok(Box::new(ScheduleAction::create(data)?)),
            NodeKind::Template => Ok(Box::new(TemplateAction::create(data)?)),
            NodeKind::Final | NodeKind::End => Ok(Box::new(EndAction::create(data)?)),
            NodeKind::Case => Err(ChatflowError::Node("case nodes are not executable".to_string())),
        }
    }
}
