use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::Session, db::mem::DbDocument},
};

impl DbDocument for Session {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("flow_id".to_string(), json!(self.flow_id.clone()));
        map.insert("flow_version".to_string(), json!(self.flow_version));
        map.insert("status".to_string(), json!(self.status.clone()));
        map.insert("queue".to_string(), json!(self.queue.clone()));
        map.insert("agent_id".to_string(), json!(self.agent_id.clone()));
        map.insert("pending_node_id".to_string(), json!(self.pending_node_id.clone()));
        map.insert("create_time".to_string(), json!(self.create_time));
        map.insert("update_time".to_string(), json!(self.update_time));
        Ok(map)
    }
}
