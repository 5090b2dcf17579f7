use serde::{Deserialize, Serialize};

use crate::{
    ChatflowError, Result,
    model,
    store::{DbCollectionIden, StoreIden},
};

#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    /// the whole schedule as JSON
    pub data: String,
    pub update_time: i64,
}

impl DbCollectionIden for Schedule {
    fn iden() -> StoreIden {
        StoreIden::Schedules
    }
}

impl Schedule {
    pub fn from_model(
        schedule: &model::Schedule,
        now: i64,
    ) -> Result<Self> {
        Ok(Self {
            id: schedule.id.clone(),
            name: schedule.name.clone(),
            data: serde_json::to_string(schedule)?,
            update_time: now,
        })
    }
}

impl TryFrom<&Schedule> for model::Schedule {
    type Error = ChatflowError;

    fn try_from(row: &Schedule) -> Result<Self> {
        let mut schedule: model::Schedule = serde_json::from_str(&row.data)?;
        schedule.id = row.id.clone();
        Ok(schedule)
    }
}
