use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    ChatflowError, Result,
    flow::node::{NodeId, NodeKind},
    runtime::Context,
};

use super::{Action, ActionOutput, Transition, decode};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GotoAction {
    #[serde(default)]
    target_anchor: String,
}

#[async_trait]
impl Action for GotoAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "targetAnchor": { "type": "string" }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Goto
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        match ctx.flow().find_anchor(&self.target_anchor) {
            Some(target) => Ok(ActionOutput::new(Transition::Jump(target.clone()))),
            None => Err(ChatflowError::Graph(format!("anchor '{}' not found", self.target_anchor))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        ChatflowError,
        flow::actions::Transition,
        runtime::Context,
    };

    #[tokio::test]
    async fn test_jump_to_anchor_or_fail() {
        let ctx = Context::for_test(
            json!({
                "nodes": [
                    {"id": "s", "type": "start"},
                    {"id": "a", "type": "anchor", "data": {"anchorName": "menu"}},
                    {"id": "g1", "type": "goto", "data": {"targetAnchor": " menu "}},
                    {"id": "g2", "type": "goto", "data": {"targetAnchor": "fim"}}
                ],
                "edges": [{"id": "e1", "source": "s", "target": "a"}]
            }),
            json!({}),
        );
        let flow = ctx.flow().clone();

        let out = flow.get_node("g1").unwrap().action.run(ctx.clone(), "g1".to_string()).await.unwrap();
        assert_eq!(out.transition, Transition::Jump("a".to_string()));

        let err = flow.get_node("g2").unwrap().action.run(ctx.clone(), "g2".to_string()).await.unwrap_err();
        assert!(matches!(err, ChatflowError::Graph(_)));
    }
}
