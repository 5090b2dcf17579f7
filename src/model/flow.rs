use serde::{Deserialize, Serialize};

use crate::{
    ChatflowError, Result,
    model::{EdgeModel, NodeModel},
};

/// `{nodes, edges}` document produced by the flow designer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphModel {
    #[serde(default)]
    pub nodes: Vec<NodeModel>,
    #[serde(default)]
    pub edges: Vec<EdgeModel>,
}

impl GraphModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<GraphModel>(s).map_err(|e| ChatflowError::Flow(format!("{}", e)))
    }

    /// Graph every new flow starts with: a lone start node.
    pub fn with_start() -> Self {
        Self {
            nodes: vec![NodeModel {
                id: "start".to_string(),
                kind: "start".to_string(),
                data: serde_json::json!({ "text": "Início" }),
                position: None,
            }],
            edges: Vec::new(),
        }
    }

    pub fn start_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == "start").count()
    }
}

/// A flow with its editable draft and its live snapshot.
///
/// `published` is only ever replaced as a whole by a publish, and `version` is
/// bumped together with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    pub name: String,
    pub draft: GraphModel,
    pub published: Option<GraphModel>,
    pub version: u64,
    pub create_time: i64,
    pub update_time: i64,
}
