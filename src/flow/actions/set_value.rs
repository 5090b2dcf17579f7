use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Result,
    flow::node::{NodeId, NodeKind},
    runtime::Context,
};

use super::{Action, ActionOutput, decode};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SetValueAction {
    #[serde(alias = "variable")]
    variable_name: String,
    #[serde(default)]
    value: Value,
}

#[async_trait]
impl Action for SetValueAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "anyOf": [
                { "required": ["variableName"] },
                { "required": ["variable"] }
            ],
            "properties": {
                "variableName": { "type": "string", "minLength": 1 },
                "variable": { "type": "string", "minLength": 1 },
                "value": {}
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::SetValue
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
    ) -> Result<ActionOutput> {
        let value = match &self.value {
            Value::String(s) => Value::String(ctx.interpolate(s)),
            v => ctx.interpolate_json(v),
        };
        ctx.emit_log(&nid, format!("{} = {}", self.variable_name, value));
        ctx.set_var(self.variable_name.trim(), value);
        Ok(ActionOutput::next())
    }
}
