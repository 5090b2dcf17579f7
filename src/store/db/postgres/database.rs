use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*, map_db_err},
};

use super::{DbInit, collection::*, synclient::SynClient};

pub struct PostgresStore {
    flows: Arc<FlowCollection>,
    versions: Arc<VersionCollection>,
    sessions: Arc<SessionCollection>,
    schedules: Arc<ScheduleCollection>,
    logs: Arc<LogCollection>,
    events: Arc<EventCollection>,
}

impl DbStore for PostgresStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        self.flows.init()?;
        self.versions.init()?;
        self.sessions.init()?;
        self.schedules.init()?;
        self.logs.init()?;
        self.events.init()?;

        s.register(self.flows());
        s.register(self.versions());
        s.register(self.sessions());
        s.register(self.schedules());
        s.register(self.logs());
        s.register(self.events());
        Ok(())
    }
}

impl PostgresStore {
    pub fn new(
        db_url: &str,
        runtime: Handle,
    ) -> Result<Self> {
        let conn = Arc::new(SynClient::connect(db_url, runtime.clone()).map_err(map_db_err)?);

        Ok(Self {
            flows: Arc::new(FlowCollection::new(&conn)),
            versions: Arc::new(VersionCollection::new(&conn)),
            sessions: Arc::new(SessionCollection::new(&conn)),
            schedules: Arc::new(ScheduleCollection::new(&conn)),
            logs: Arc::new(LogCollection::new(&conn, runtime.clone())),
            events: Arc::new(EventCollection::new(&conn, runtime)),
        })
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
