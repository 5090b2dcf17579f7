use std::{
    any::Any,
    collections::HashMap,
    convert::AsRef,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::trace;

use crate::{ChatflowError, FlowDefinition, GraphModel, Result, SessionStatus, ShareLock, model};

use super::{DbCollection, DbCollectionIden, StoreIden, data::*, query::Query};

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

/// Type-erased registry of collections, filled by a [`DbStore`](super::DbStore)
/// backend.
pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn collection<DATA>(&self) -> Result<Arc<dyn DbCollection<Item = DATA>>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);

        collections
            .get(&DATA::iden())
            .and_then(|c| c.downcast_ref::<DynDbSetRef<DATA>>())
            .map(|v| v.0.clone())
            .ok_or(ChatflowError::Store(format!("fail to get collection: {}", DATA::iden().as_ref())))
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
    }

    pub fn flows(&self) -> Result<Arc<dyn DbCollection<Item = Flow>>> {
        self.collection()
    }

    pub fn versions(&self) -> Result<Arc<dyn DbCollection<Item = FlowVersion>>> {
        self.collection()
    }

    pub fn sessions(&self) -> Result<Arc<dyn DbCollection<Item = Session>>> {
        self.collection()
    }

    pub fn schedules(&self) -> Result<Arc<dyn DbCollection<Item = Schedule>>> {
        self.collection()
    }

    pub fn logs(&self) -> Result<Arc<dyn DbCollection<Item = Log>>> {
        self.collection()
    }

    pub fn events(&self) -> Result<Arc<dyn DbCollection<Item = Event>>> {
        self.collection()
    }

    pub fn load_flow(
        &self,
        id: &str,
    ) -> Result<FlowDefinition> {
        let flows = self.flows()?;
        if !flows.exists(id)? {
            return Err(ChatflowError::Flow(format!("flow '{}' not found", id)));
        }
        FlowDefinition::try_from(&flows.find(id)?)
    }

    /// Insert or replace a flow row.
    pub fn save_flow(
        &self,
        def: &FlowDefinition,
    ) -> Result<()> {
        trace!("store::save_flow({})", def.id);
        let flows = self.flows()?;
        let row = Flow::try_from(def)?;
        if flows.exists(&def.id)? {
            flows.update(&row)?;
        } else {
            flows.create(&row)?;
        }
        Ok(())
    }

    pub fn save_version(
        &self,
        flow_id: &str,
        version: u64,
        graph: &GraphModel,
        now: i64,
    ) -> Result<()> {
        trace!("store::save_version({}@{})", flow_id, version);
        self.versions()?.create(&FlowVersion {
            id: FlowVersion::key(flow_id, version),
            flow_id: flow_id.to_string(),
            version: version as i64,
            graph: serde_json::to_string(graph)?,
            publish_time: now,
        })?;
        Ok(())
    }

    pub fn load_version(
        &self,
        flow_id: &str,
        version: u64,
    ) -> Result<GraphModel> {
        let versions = self.versions()?;
        let key = FlowVersion::key(flow_id, version);
        if !versions.exists(&key)? {
            return Err(ChatflowError::Flow(format!("version '{}' not found", key)));
        }
        Ok(serde_json::from_str(&versions.find(&key)?.graph)?)
    }

    pub fn load_session(
        &self,
        sid: &str,
    ) -> Result<model::Session> {
        let sessions = self.sessions()?;
        if !sessions.exists(sid)? {
            return Err(ChatflowError::Session(format!("session '{}' not found", sid)));
        }
        model::Session::try_from(&sessions.find(sid)?)
    }

    /// Status as last written, without decoding the transcript.
    pub fn session_status(
        &self,
        sid: &str,
    ) -> Result<SessionStatus> {
        let row = self.sessions()?.find(sid)?;
        row.status.parse().map_err(|_| ChatflowError::Convert(format!("unknown session status '{}'", row.status)))
    }

    pub fn create_session(
        &self,
        session: &model::Session,
    ) -> Result<()> {
        trace!("store::create_session({})", session.id);
        self.sessions()?.create(&Session::try_from(session)?)?;
        Ok(())
    }

    /// Replace the whole session row.
    pub fn save_session(
        &self,
        session: &model::Session,
    ) -> Result<()> {
        let row = Session::try_from(session)?;
        if !self.sessions()?.update(&row)? {
            return Err(ChatflowError::Store(format!("session '{}' not found", session.id)));
        }
        Ok(())
    }

    pub fn save_schedule(
        &self,
        schedule: &model::Schedule,
        now: i64,
    ) -> Result<()> {
        if schedule.id.is_empty() {
            return Err(ChatflowError::Store("missing id in schedule".to_string()));
        }
        let schedules = self.schedules()?;
        let row = Schedule::from_model(schedule, now)?;
        if schedules.exists(&schedule.id)? {
            schedules.update(&row)?;
        } else {
            schedules.create(&row)?;
        }
        Ok(())
    }

    pub fn load_schedule(
        &self,
        id: &str,
    ) -> Result<model::Schedule> {
        let schedules = self.schedules()?;
        if !schedules.exists(id)? {
            return Err(ChatflowError::Store(format!("schedule '{}' not found", id)));
        }
        model::Schedule::try_from(&schedules.find(id)?)
    }

    /// Events of a session, oldest first.
    pub fn session_events(
        &self,
        sid: &str,
        limit: usize,
    ) -> Result<Vec<Event>> {
        Ok(self.events()?.query(&Query::new().with_filter("sid", sid).with_order("timestamp", false).with_limit(limit))?.rows)
    }

    /// Logs of a session, oldest first.
    pub fn session_logs(
        &self,
        sid: &str,
        limit: usize,
    ) -> Result<Vec<Log>> {
        Ok(self.logs()?.query(&Query::new().with_filter("sid", sid).with_order("timestamp", false).with_limit(limit))?.rows)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Store;
    use crate::{
        FlowDefinition, GraphModel, Schedule, Session, SessionStatus,
        store::{DbStore, MemStore},
    };

    fn store() -> Store {
        let store = Store::new();
        MemStore::new().init(&store).unwrap();
        store
    }

    #[test]
    fn test_flow_and_versions() {
        let store = store();
        assert!(store.load_flow("f1").is_err());

        let mut def = FlowDefinition {
            id: "f1".to_string(),
            name: "suporte".to_string(),
            draft: GraphModel::with_start(),
            ..Default::default()
        };
        store.save_flow(&def).unwrap();
        def.version = 1;
        def.published = Some(def.draft.clone());
        store.save_flow(&def).unwrap();
        store.save_version("f1", 1, &def.draft, 5).unwrap();

        assert_eq!(store.load_flow("f1").unwrap(), def);
        assert_eq!(store.load_version("f1", 1).unwrap(), def.draft);
        assert!(store.load_version("f1", 2).is_err());
        assert!(store.save_version("f1", 1, &def.draft, 6).is_err());
    }

    #[test]
    fn test_session_roundtrip_and_status() {
        let store = store();
        let mut s = Session::new("s1".to_string(), "f1".to_string(), 1, 0);
        assert!(store.save_session(&s).is_err());
        store.create_session(&s).unwrap();

        s.status = SessionStatus::Closed;
        s.variables.set("cpf", json!("123"));
        store.save_session(&s).unwrap();

        assert_eq!(store.session_status("s1").unwrap(), SessionStatus::Closed);
        assert_eq!(store.load_session("s1").unwrap(), s);
        assert!(store.load_session("nope").is_err());
    }

    #[test]
    fn test_schedules() {
        let store = store();
        let schedule: Schedule = serde_json::from_value(json!({
            "id": "office",
            "name": "office",
            "days": { "monday": { "active": true, "start": "08:00", "end": "18:00" } }
        }))
        .unwrap();
        store.save_schedule(&schedule, 1).unwrap();
        store.save_schedule(&schedule, 2).unwrap();
        assert_eq!(store.load_schedule("office").unwrap(), schedule);
        assert!(store.save_schedule(&Schedule::default(), 1).is_err());
    }
}
