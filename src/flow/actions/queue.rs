use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Result,
    flow::node::{NodeId, NodeKind},
    runtime::Context,
};

use super::{Action, ActionOutput, Transition, decode};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueueAction {
    #[serde(alias = "queue")]
    queue_name: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl Action for QueueAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "anyOf": [
                { "required": ["queueName"] },
                { "required": ["queue"] }
            ],
            "properties": {
                "queueName": { "type": "string", "minLength": 1 },
                "queue": { "type": "string", "minLength": 1 },
                "text": { "type": ["string", "null"] },
                "reason": { "type": ["string", "null"] }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Queue
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        let text = match self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => ctx.interpolate(text),
            None => ctx.messages().handoff.clone(),
        };
        let output = ActionOutput::new(Transition::Handoff {
            queue: ctx.interpolate(&self.queue_name),
            reason: self.reason.as_deref().map(|r| ctx.interpolate(r)),
        });
        Ok(output.with_text(text))
    }
}
