use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Button, Result,
    flow::{
        edge::SourceHandle,
        node::{NodeId, NodeKind},
    },
    runtime::Context,
};

use super::{Action, ActionOutput, BotMessage, ResumeEvent, Transition, decode};

/// Text with quick-reply buttons. Pauses until one is clicked.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAction {
    #[serde(default)]
    text: String,
    #[serde(default)]
    buttons: Vec<Button>,
    #[serde(default)]
    variable_name: Option<String>,
}

impl TemplateAction {
    fn prompt(
        &self,
        ctx: &Context,
    ) -> BotMessage {
        BotMessage {
            text: ctx.interpolate(&self.text),
            buttons: Some(
                self.buttons
                    .iter()
                    .map(|b| Button {
                        id: b.id.clone(),
                        label: ctx.interpolate(&b.label),
                    })
                    .collect(),
            ),
        }
    }

    /// Button whose label equals `text`, ignoring case and surrounding spaces.
    fn button_by_label(
        &self,
        ctx: &Context,
        text: &str,
    ) -> Option<Button> {
        let wanted = text.trim().to_lowercase();
        self.buttons.iter().find(|b| ctx.interpolate(&b.label).trim().to_lowercase() == wanted).cloned()
    }

    fn click(
        &self,
        ctx: &Context,
        nid: &NodeId,
        id: String,
        label: String,
    ) -> ActionOutput {
        if let Some(var) = self.variable_name.as_deref().filter(|v| !v.trim().is_empty()) {
            ctx.set_var(var.trim(), label.clone().into());
        }
        ctx.emit_log(nid, format!("clicked '{}' ({})", label, id));

        let handle = SourceHandle::Branch(id);
        if ctx.flow().has_route(nid, &handle) {
            ActionOutput::branch(handle)
        } else {
            ActionOutput::new(Transition::Only)
        }
    }
}

#[async_trait]
impl Action for TemplateAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "variableName": { "type": ["string", "null"] },
                "buttons": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "label"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "label": { "type": "string" }
                        }
                    }
                }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Template
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _: NodeId,
    ) -> Result<ActionOutput> {
        Ok(ActionOutput::new(Transition::Pause).with_message(self.prompt(&ctx)))
    }

    async fn resume(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
        event: ResumeEvent,
    ) -> Result<ActionOutput> {
        match event {
            ResumeEvent::ButtonClick {
                id,
                label,
            } => Ok(self.click(&ctx, &nid, id, label)),
            ResumeEvent::UserText(text) => match self.button_by_label(&ctx, &text) {
                Some(button) => Ok(self.click(&ctx, &nid, button.id, button.label)),
                // not an option, ask again
                None => Ok(ActionOutput::new(Transition::Pause).with_message(self.prompt(&ctx))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{
        flow::{
            actions::{ResumeEvent, Transition},
            edge::SourceHandle,
        },
        runtime::Context,
    };

    fn ctx() -> Arc<Context> {
        Context::for_test(
            json!({
                "nodes": [
                    {"id": "s", "type": "start"},
                    {"id": "t", "type": "template", "data": {
                        "text": "Olá {nome}, escolha:",
                        "variableName": "opcao",
                        "buttons": [{"id": "b1", "label": "Vendas"}, {"id": "b2", "label": "Suporte"}]
                    }},
                    {"id": "case-1", "type": "case", "data": {"buttonId": "b1"}},
                    {"id": "m1", "type": "message", "data": {"text": "vendas"}},
                    {"id": "m2", "type": "message", "data": {"text": "suporte"}}
                ],
                "edges": [
                    {"id": "e1", "source": "s", "target": "t"},
                    {"id": "e2", "source": "t", "target": "case-1"},
                    {"id": "e3", "source": "case-1", "target": "m1"},
                    {"id": "e4", "source": "t", "target": "m2", "sourceHandle": "b2"}
                ]
            }),
            json!({"nome": "Ana"}),
        )
    }

    #[tokio::test]
    async fn test_prompt_pauses_with_buttons() {
        let ctx = ctx();
        let node = ctx.flow().get_node("t").unwrap();
        let out = node.action.run(ctx.clone(), "t".to_string()).await.unwrap();
        assert_eq!(out.transition, Transition::Pause);
        assert_eq!(out.messages[0].text, "Olá Ana, escolha:");
        assert_eq!(out.messages[0].buttons.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_click_follows_button_route() {
        let ctx = ctx();
        let node = ctx.flow().get_node("t").unwrap();
        let click = ResumeEvent::ButtonClick {
            id: "b1".to_string(),
            label: "Vendas".to_string(),
        };
        let out = node.action.resume(ctx.clone(), "t".to_string(), click).await.unwrap();
        assert_eq!(out.transition, Transition::Branch(SourceHandle::Branch("b1".to_string())));
        assert_eq!(ctx.get_var("opcao"), Some(json!("Vendas")));
        assert_eq!(ctx.flow().next("t", &SourceHandle::Branch("b1".to_string())).unwrap(), Some("m1".to_string()));
    }

    #[tokio::test]
    async fn test_typed_label_counts_as_click() {
        let ctx = ctx();
        let node = ctx.flow().get_node("t").unwrap();
        let out = node.action.resume(ctx.clone(), "t".to_string(), ResumeEvent::UserText(" suporte ".to_string())).await.unwrap();
        assert_eq!(out.transition, Transition::Branch(SourceHandle::Branch("b2".to_string())));

        let out = node.action.resume(ctx.clone(), "t".to_string(), ResumeEvent::UserText("outro".to_string())).await.unwrap();
        assert_eq!(out.transition, Transition::Pause);
        assert_eq!(out.messages.len(), 1);
    }
}
