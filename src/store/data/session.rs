use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    ChatflowError, Result, SessionStatus,
    model,
    store::{DbCollectionIden, StoreIden},
};

/// Session row. Variables, transcript and halt are JSON text.
#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub flow_id: String,
    pub flow_version: i64,
    pub status: String,
    pub variables: String,
    pub messages: String,
    pub current_node_id: Option<String>,
    pub pending_node_id: Option<String>,
    pub queue: Option<String>,
    pub agent_id: Option<String>,
    pub halt: Option<String>,
    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for Session {
    fn iden() -> StoreIden {
        StoreIden::Sessions
    }
}

impl TryFrom<&model::Session> for Session {
    type Error = ChatflowError;

    fn try_from(s: &model::Session) -> Result<Self> {
        Ok(Self {
            id: s.id.clone(),
            flow_id: s.flow_id.clone(),
            flow_version: s.flow_version as i64,
            status: s.status.as_ref().to_string(),
            variables: serde_json::to_string(&s.variables)?,
            messages: serde_json::to_string(&s.messages)?,
            current_node_id: s.current_node_id.clone(),
            pending_node_id: s.pending_node_id.clone(),
            queue: s.queue.clone(),
            agent_id: s.agent_id.clone(),
            halt: s.halt.as_ref().map(serde_json::to_string).transpose()?,
            create_time: s.create_time,
            update_time: s.update_time,
        })
    }
}

impl TryFrom<&Session> for model::Session {
    type Error = ChatflowError;

    fn try_from(row: &Session) -> Result<Self> {
        Ok(Self {
            id: row.id.clone(),
            flow_id: row.flow_id.clone(),
            flow_version: row.flow_version.max(0) as u64,
            status: SessionStatus::from_str(&row.status).map_err(|_| ChatflowError::Convert(format!("unknown session status '{}'", row.status)))?,
            variables: serde_json::from_str(&row.variables)?,
            messages: serde_json::from_str(&row.messages)?,
            current_node_id: row.current_node_id.clone(),
            pending_node_id: row.pending_node_id.clone(),
            queue: row.queue.clone(),
            agent_id: row.agent_id.clone(),
            halt: row.halt.as_deref().map(serde_json::from_str).transpose()?,
            create_time: row.create_time,
            update_time: row.update_time,
        })
    }
}
