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

/// Labels the designer puts on a fresh start node.
const PLACEHOLDERS: [&str; 4] = ["", "start", "início", "inicio"];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartAction {
    #[serde(default)]
    text: Option<String>,
}

impl StartAction {
    fn greeting(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !PLACEHOLDERS.contains(&t.trim().to_lowercase().as_str()))
    }
}

#[async_trait]
impl Action for StartAction {
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
        NodeKind::Start
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        let output = ActionOutput::new(Transition::Only);
        Ok(match self.greeting() {
            Some(text) => output.with_text(ctx.interpolate(text)),
            None => output,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::StartAction;
    use crate::flow::actions::Action;

    #[test]
    fn test_placeholder_text_is_skipped() {
        for text in ["Início", " start ", ""] {
            assert_eq!(StartAction::create(json!({ "text": text })).unwrap().greeting(), None);
        }
        assert_eq!(StartAction::create(json!({})).unwrap().greeting(), None);
        assert_eq!(StartAction::create(json!({ "text": "Olá!" })).unwrap().greeting(), Some("Olá!"));
    }
}
