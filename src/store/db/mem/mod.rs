mod collect;
mod r#impl;

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};
pub use collect::Collect;

#[derive(Debug, Clone)]
pub struct MemStore {
    flows: Arc<Collect<Flow>>,
    versions: Arc<Collect<FlowVersion>>,
    sessions: Arc<Collect<Session>>,
    schedules: Arc<Collect<Schedule>>,
    logs: Arc<Collect<Log>>,
    events: Arc<Collect<Event>>,
}

trait DbDocument: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    /// Columns that can be filtered and ordered on.
    fn doc(&self) -> Result<HashMap<String, JsonValue>>;
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        s.register(self.flows());
        s.register(self.versions());
        s.register(self.sessions());
        s.register(self.schedules());
        s.register(self.logs());
        s.register(self.events());
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            flows: Arc::new(Collect::new("flows")),
            versions: Arc::new(Collect::new("versions")),
            sessions: Arc::new(Collect::new("sessions")),
            schedules: Arc::new(Collect::new("schedules")),
            logs: Arc::new(Collect::new("logs")),
            events: Arc::new(Collect::new("events")),
        }
    }

    pub fn flows(&self) -> Arc<dyn DbCollection<Item = Flow> + Send + Sync> {
        self.flows.clone()
    }

    pub fn versions(&self) -> Arc<dyn DbCollection<Item = FlowVersion> + Send + Sync> {
        self.versions.clone()
    }

    pub fn sessions(&self) -> Arc<dyn DbCollection<Item = Session> + Send + Sync> {
        self.sessions.clone()
    }

    pub fn schedules(&self) -> Arc<dyn DbCollection<Item = Schedule> + Send + Sync> {
        self.schedules.clone()
    }

    pub fn logs(&self) -> Arc<dyn DbCollection<Item = Log> + Send + Sync> {
        self.logs.clone()
    }

    pub fn events(&self) -> Arc<dyn DbCollection<Item = Event> + Send + Sync> {
        self.events.clone()
    }
}
