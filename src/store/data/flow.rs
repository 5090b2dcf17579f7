use serde::{Deserialize, Serialize};

use crate::{
    ChatflowError, FlowDefinition, Result,
    store::{DbCollectionIden, StoreIden},
};

/// Flow row. Graphs are stored as JSON text.
#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub draft: String,
    pub published: Option<String>,
    pub version: i64,
    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for Flow {
    fn iden() -> StoreIden {
        StoreIden::Flows
    }
}

impl TryFrom<&FlowDefinition> for Flow {
    type Error = ChatflowError;

    fn try_from(def: &FlowDefinition) -> Result<Self> {
        Ok(Self {
            id: def.id.clone(),
            name: def.name.clone(),
            draft: serde_json::to_string(&def.draft)?,
            published: def.published.as_ref().map(serde_json::to_string).transpose()?,
            version: def.version as i64,
            create_time: def.create_time,
            update_time: def.update_time,
        })
    }
}

impl TryFrom<&Flow> for FlowDefinition {
    type Error = ChatflowError;

    fn try_from(row: &Flow) -> Result<Self> {
        Ok(Self {
            id: row.id.clone(),
            name: row.name.clone(),
            draft: serde_json::from_str(&row.draft)?,
            published: row.published.as_deref().map(serde_json::from_str).transpose()?,
            version: row.version.max(0) as u64,
            create_time: row.create_time,
            update_time: row.update_time,
        })
    }
}
