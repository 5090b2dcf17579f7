use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Result,
    evaluator::{Condition, first_match},
    flow::{
        edge::{FixedHandle, SourceHandle},
        node::{NodeId, NodeKind},
    },
    runtime::Context,
};

use super::{Action, ActionOutput, Transition, decode};

fn default_has_else() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConditionAction {
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default = "default_has_else")]
    has_else: bool,
}

#[async_trait]
impl Action for ConditionAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "conditions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "variable"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "variable": { "type": "string" },
                            "operator": { "type": "string" },
                            "value": {}
                        }
                    }
                },
                "hasElse": { "type": "boolean" }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Condition
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
    ) -> Result<ActionOutput> {
        let matched = ctx.with_vars(|vars| first_match(&self.conditions, vars).map(|c| c.id.clone()));

        if let Some(id) = matched {
            ctx.emit_log(&nid, format!("matched rule '{}'", id));
            return Ok(ActionOutput::branch(SourceHandle::Branch(id)));
        }

        let otherwise = SourceHandle::Fixed(FixedHandle::Else);
        if self.has_else && ctx.flow().has_route(&nid, &otherwise) {
            ctx.emit_log(&nid, "no rule matched, taking else".to_string());
            return Ok(ActionOutput::branch(otherwise));
        }

        Ok(ActionOutput::new(Transition::Unmatched(format!("condition '{}' matched no rule and has no else route", nid))))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::ConditionAction;
    use crate::{
        flow::{
            actions::{Action, Transition},
            edge::{FixedHandle, SourceHandle},
        },
        runtime::Context,
    };

    fn graph(
        has_else: bool,
        else_edge: bool,
    ) -> Value {
        let mut edges = vec![
            json!({"id": "e1", "source": "s", "target": "c"}),
            json!({"id": "e2", "source": "c", "target": "m1", "sourceHandle": "gold"}),
            json!({"id": "e3", "source": "c", "target": "m2", "sourceHandle": "paid"}),
        ];
        if else_edge {
            edges.push(json!({"id": "e4", "source": "c", "target": "m3", "sourceHandle": "else"}));
        }
        json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "c", "type": "condition", "data": {
                    "hasElse": has_else,
                    "conditions": [
                        {"id": "gold", "variable": "plan", "operator": "==", "value": "gold"},
                        {"id": "paid", "variable": "plan", "operator": "!=", "value": "free"}
                    ]
                }},
                {"id": "m1", "type": "message", "data": {"text": "a"}},
                {"id": "m2", "type": "message", "data": {"text": "b"}},
                {"id": "m3", "type": "message", "data": {"text": "c"}}
            ],
            "edges": edges
        })
    }

    async fn run(
        graph: Value,
        vars: Value,
    ) -> Transition {
        let ctx = Context::for_test(graph, vars);
        let node = ctx.flow().get_node("c").unwrap();
        node.action.run(ctx.clone(), "c".to_string()).await.unwrap().transition
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let t = run(graph(true, true), json!({"plan": "gold"})).await;
        assert_eq!(t, Transition::Branch(SourceHandle::Branch("gold".to_string())));

        let t = run(graph(true, true), json!({"plan": "silver"})).await;
        assert_eq!(t, Transition::Branch(SourceHandle::Branch("paid".to_string())));
    }

    #[tokio::test]
    async fn test_else_route() {
        let t = run(graph(true, true), json!({"plan": "free"})).await;
        assert_eq!(t, Transition::Branch(SourceHandle::Fixed(FixedHandle::Else)));
    }

    #[tokio::test]
    async fn test_no_match_without_else_is_unmatched() {
        assert!(matches!(run(graph(false, true), json!({"plan": "free"})).await, Transition::Unmatched(_)));
        assert!(matches!(run(graph(true, false), json!({"plan": "free"})).await, Transition::Unmatched(_)));
    }

    #[test]
    fn test_has_else_defaults_to_true() {
        let action = ConditionAction::create(json!({"conditions": []})).unwrap();
        assert!(action.has_else);
        assert!(ConditionAction::create(json!({"conditions": [{"variable": "x"}]})).is_err());
    }
}
