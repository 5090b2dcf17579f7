use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    ChatflowError, Result,
    flow::node::{NodeId, NodeKind},
    runtime::Context,
};

use super::{Action, ActionOutput, decode};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DelayAction {
    /// seconds, number or numeric text
    #[serde(default)]
    delay: Value,
}

impl DelayAction {
    fn seconds(&self) -> Result<f64> {
        let secs = match &self.delay {
            Value::Null => 0.0,
            Value::Number(n) => n.as_f64().unwrap_or_default(),
            Value::String(s) if s.trim().is_empty() => 0.0,
            Value::String(s) => s.trim().replace(',', ".").parse::<f64>().map_err(|_| ChatflowError::Node(format!("invalid delay '{}'", s)))?,
            v => return Err(ChatflowError::Node(format!("invalid delay {}", v))),
        };
        if !secs.is_finite() || secs < 0.0 {
            return Err(ChatflowError::Node(format!("invalid delay {}", secs)));
        }
        Ok(secs)
    }

    /// Seconds to actually wait, and whether `max_secs` shortened them.
    fn wait_secs(
        &self,
        max_secs: u64,
    ) -> Result<(f64, bool)> {
        let wanted = self.seconds()?;
        let max = max_secs as f64;
        Ok(if wanted > max { (max, true) } else { (wanted, false) })
    }
}

#[async_trait]
impl Action for DelayAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        let action: Self = decode(&Self::schema(), params)?;
        action.seconds()?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "delay": { "type": ["number", "string", "null"], "description": "Seconds to wait" }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Delay
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
    ) -> Result<ActionOutput> {
        let (secs, cut) = self.wait_secs(ctx.settings().max_delay_secs)?;
        if cut {
            warn!("delay of node {} cut to max_delay_secs ({}s)", nid, secs);
            ctx.emit_log(&nid, format!("delay exceeds max_delay_secs, waiting {}s instead", secs));
        }
        ctx.emit_log(&nid, format!("waiting {}s", secs));
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        Ok(ActionOutput::next())
    }
}
