use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Result,
    evaluator::evaluate_script,
    flow::node::{NodeId, NodeKind},
    runtime::Context,
};

use super::{Action, ActionOutput, decode};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScriptAction {
    #[serde(alias = "code")]
    script: String,
}

#[async_trait]
impl Action for ScriptAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "anyOf": [
                { "required": ["script"] },
                { "required": ["code"] }
            ],
            "properties": {
                "script": { "type": "string", "description": "JavaScript function body, gets `vars`" },
                "code": { "type": "string" }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Script
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
    ) -> Result<ActionOutput> {
        let delta = evaluate_script(&self.script, ctx.vars_snapshot(), ctx.script_limits()).await?;
        ctx.emit_log(&nid, format!("script changed {} variable(s)", delta.len()));
        ctx.merge_vars(delta);
        Ok(ActionOutput::next())
    }
}
