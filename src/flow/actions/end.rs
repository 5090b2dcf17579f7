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

/// Backs both `final` and `end` nodes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EndAction {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl Action for EndAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": ["string", "null"] }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::End
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        let text = match self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => ctx.interpolate(text),
            None => ctx.messages().closing.clone(),
        };
        Ok(ActionOutput::new(Transition::Close).with_text(text))
    }
}
