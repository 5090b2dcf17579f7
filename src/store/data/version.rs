use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// Immutable published graph, id is `flow_id@version`.
#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct FlowVersion {
    pub id: String,
    pub flow_id: String,
    pub version: i64,
    pub graph: String,
    pub publish_time: i64,
}

impl FlowVersion {
    pub fn key(
        flow_id: &str,
        version: u64,
    ) -> String {
        format!("{}@{}", flow_id, version)
    }
}

impl DbCollectionIden for FlowVersion {
    fn iden() -> StoreIden {
        StoreIden::Versions
    }
}
