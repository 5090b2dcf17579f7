use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Result,
    flow::node::{NodeId, NodeKind},
    runtime::Context,
};

use super::{Action, ActionOutput, decode};

/// Named jump target, passes straight through.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnchorAction {
    #[serde(default)]
    anchor_name: String,
}

#[async_trait]
impl Action for AnchorAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "anchorName": { "type": "string" }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Anchor
    }

    async fn run(
        &self,
        _: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        Ok(ActionOutput::next())
    }
}
