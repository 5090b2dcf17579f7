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

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageAction {
    text: String,
}

#[async_trait]
impl Action for MessageAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["text"],
            "properties": {
                "text": { "type": "string", "description": "Message text, supports {variable} placeholders" }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Message
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        Ok(ActionOutput::next().with_text(ctx.interpolate(&self.text)))
    }
}
