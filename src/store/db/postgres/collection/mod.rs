mod event;
mod flow;
mod log;
mod schedule;
mod session;
mod version;

use std::sync::Arc;

use sea_query::{Alias as SeaAlias, Condition, Expr as SeaExpr, SimpleExpr};
use serde_json::Value as JsonValue;

pub use event::EventCollection;
pub use flow::FlowCollection;
pub use log::LogCollection;
pub use schedule::ScheduleCollection;
pub use session::SessionCollection;
pub use version::VersionCollection;

pub(crate) use crate::store::map_db_err;
use crate::store::query::Query;

use super::synclient::SynClient;

pub type DbConnection = Arc<SynClient>;

fn into_value(value: &JsonValue) -> SimpleExpr {
    match value {
        JsonValue::Bool(b) => (*b).into(),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        JsonValue::String(s) => s.clone().into(),
        v => v.to_string().into(),
    }
}

/// Equality filters of `q` joined with AND.
pub fn into_query(q: &Query) -> Condition {
    let mut cond = Condition::all();
    for (key, value) in q.filters() {
        cond = match value {
            JsonValue::Null => cond.add(SeaExpr::col(SeaAlias::new(key)).is_null()),
            v => cond.add(SeaExpr::col(SeaAlias::new(key)).eq(into_value(v))),
        };
    }
    cond
}
