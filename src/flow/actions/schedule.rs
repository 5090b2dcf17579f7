use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    DayWindow, Result, Schedule,
    flow::{
        edge::{FixedHandle, SourceHandle},
        node::{NodeId, NodeKind},
    },
    runtime::Context,
};

use super::{Action, ActionOutput, decode};

/// Routes `inside` or `outside` depending on business hours.
///
/// The hours come from the stored schedule `scheduleId`, or from `days`
/// written inline on the node.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleAction {
    #[serde(default)]
    schedule_id: Option<String>,
    #[serde(default)]
    days: HashMap<String, DayWindow>,
    #[serde(default)]
    utc_offset_minutes: Option<i32>,
}

impl ScheduleAction {
    fn schedule(
        &self,
        ctx: &Context,
    ) -> Result<Schedule> {
        match self.schedule_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => ctx.store().load_schedule(id),
            None => Ok(Schedule {
                days: self.days.clone(),
                utc_offset_minutes: self.utc_offset_minutes,
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl Action for ScheduleAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "scheduleId": { "type": ["string", "null"] },
                "utcOffsetMinutes": { "type": ["integer", "null"] },
                "days": {
                    "type": "object",
                    "additionalProperties": {
                        "type": "object",
                        "required": ["active", "start", "end"],
                        "properties": {
                            "active": { "type": "boolean" },
                            "start": { "type": "string" },
                            "end": { "type": "string" }
                        }
                    }
                }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::Schedule
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
    ) -> Result<ActionOutput> {
        let schedule = self.schedule(&ctx)?;
        let open = schedule.is_open(ctx.now(), ctx.settings().utc_offset_minutes);
        ctx.emit_log(&nid, format!("schedule '{}' is {}", schedule.id, if open { "open" } else { "closed" }));

        Ok(ActionOutput::branch(SourceHandle::Fixed(if open {
            FixedHandle::Inside
        } else {
            FixedHandle::Outside
        })))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ScheduleAction;
    use crate::{
        Schedule,
        flow::{
            actions::{Action, Transition},
            edge::{FixedHandle, SourceHandle},
        },
        runtime::Context,
    };

    fn branch(t: Transition) -> FixedHandle {
        match t {
            Transition::Branch(SourceHandle::Fixed(h)) => h,
            t => panic!("unexpected transition {:?}", t),
        }
    }

    // the test clock sits on monday 10:00 utc
    #[tokio::test]
    async fn test_inline_days() {
        let ctx = Context::for_test(json!({"nodes": [{"id": "s", "type": "start"}]}), json!({}));
        let open = ScheduleAction::create(json!({"days": {"monday": {"active": true, "start": "09:00", "end": "18:00"}}})).unwrap();
        assert_eq!(branch(open.run(ctx.clone(), "h".to_string()).await.unwrap().transition), FixedHandle::Inside);

        let early = ScheduleAction::create(json!({
            "utcOffsetMinutes": -180,
            "days": {"monday": {"active": true, "start": "09:00", "end": "18:00"}}
        }))
        .unwrap();
        assert_eq!(branch(early.run(ctx.clone(), "h".to_string()).await.unwrap().transition), FixedHandle::Outside);
    }

    #[tokio::test]
    async fn test_stored_schedule() {
        let ctx = Context::for_test(json!({"nodes": [{"id": "s", "type": "start"}]}), json!({}));
        let schedule: Schedule = serde_json::from_value(json!({
            "id": "comercial",
            "name": "Comercial",
            "days": {"segunda": {"active": false, "start": "09:00", "end": "18:00"}}
        }))
        .unwrap();
        ctx.store().save_schedule(&schedule, 0).unwrap();

        let action = ScheduleAction::create(json!({"scheduleId": "comercial"})).unwrap();
        assert_eq!(branch(action.run(ctx.clone(), "h".to_string()).await.unwrap().transition), FixedHandle::Outside);

        let missing = ScheduleAction::create(json!({"scheduleId": "nope"})).unwrap();
        assert!(missing.run(ctx.clone(), "h".to_string()).await.is_err());
    }
}
