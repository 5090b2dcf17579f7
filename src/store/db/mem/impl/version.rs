use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::FlowVersion, db::mem::DbDocument},
};

impl DbDocument for FlowVersion {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("flow_id".to_string(), json!(self.flow_id.clone()));
        map.insert("version".to_string(), json!(self.version));
        map.insert("publish_time".to_string(), json!(self.publish_time));
        Ok(map)
    }
}
