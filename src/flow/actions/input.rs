use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    ChatflowError, Result,
    flow::node::{NodeId, NodeKind},
    runtime::Context,
};

use super::{Action, ActionOutput, ResumeEvent, Transition, decode};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InputAction {
    #[serde(default)]
    text: Option<String>,
    #[serde(alias = "variable")]
    variable_name: String,
}

#[async_trait]
impl Action for InputAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        let action: Self = decode(&Self::schema(), params)?;
        if action.variable_name.trim().is_empty() {
            return Err(ChatflowError::Node("input needs a variableName".to_string()));
        }
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "anyOf": [
                { "required": ["variableName"] },
                { "required": ["variable"] }
            ],
            "properties": {
                "text": { "type": ["string", "null"] },
                "variableName": { "type": "string" },
                "variable": { "type": "string" }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Input
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        let output = ActionOutput::new(Transition::Pause);
        Ok(match self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => output.with_text(ctx.interpolate(text)),
            None => output,
        })
    }

    async fn resume(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
        event: ResumeEvent,
    ) -> Result<ActionOutput> {
        match event {
            ResumeEvent::UserText(text) => {
                ctx.set_var(self.variable_name.trim(), text.into());
                Ok(ActionOutput::new(Transition::Only))
            }
            ResumeEvent::ButtonClick {
                ..
            } => Err(ChatflowError::Session(format!("node '{}' waits for text, not a button", nid))),
        }
    }
}
