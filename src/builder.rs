use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::{
    ChatflowError, Config, Engine, Result, StoreType,
    runtime::{Clock, NoopTransport, SystemClock, Transport},
    store::{DbStore, MemStore, PostgresStore, Store},
};

pub struct EngineBuilder {
    config: Config,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    rt: Option<Arc<Runtime>>,
    handle: Option<Handle>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            transport: Arc::new(NoopTransport),
            clock: Arc::new(SystemClock),
            rt: None,
            handle: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    /// Chat backend the engine writes messages, queue transfers and closes to.
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.transport = transport;
        self
    }

    pub fn clock(
        mut self,
        clock: Arc<dyn Clock>,
    ) -> Self {
        self.clock = clock;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Run on an existing runtime without owning it.
    pub fn handle(
        mut self,
        handle: Handle,
    ) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Builds the engine.
    ///
    /// Without an explicit runtime or handle the engine joins the runtime it
    /// is built on, or creates its own when built outside of one.
    pub fn build(self) -> Result<Engine> {
        let (handle, owned) = match (self.rt, self.handle) {
            (Some(rt), _) => (rt.handle().clone(), Some(rt)),
            (None, Some(handle)) => (handle, None),
            (None, None) => match Handle::try_current() {
                Ok(handle) => (handle, None),
                Err(_) => {
                    let rt = Arc::new(Builder::new_multi_thread().worker_threads(self.config.async_worker_thread_number.into()).enable_all().build()?);
                    (rt.handle().clone(), Some(rt))
                }
            },
        };

        let store = Store::new();
        let db: Box<dyn DbStore> = match self.config.store.store_type {
            StoreType::Mem => Box::new(MemStore::new()),
            StoreType::Postgres => {
                let postgres = self
                    .config
                    .store
                    .postgres
                    .as_ref()
                    .ok_or_else(|| ChatflowError::Config("[store.postgres] is required when store_type is postgres".to_string()))?;
                Box::new(PostgresStore::new(&postgres.database_url, handle.clone())?)
            }
        };
        db.init(&store)?;
        debug!("store initialized ({:?})", self.config.store.store_type);

        let http = reqwest::Client::builder().build().map_err(|e| ChatflowError::Engine(format!("failed to build http client: {}", e)))?;

        Ok(Engine::new(self.config, store, self.transport, self.clock, http, handle, owned))
    }
}
