//! Chat flow engine - the main entry point for Chatflow.
//!
//! The engine manages flows and live sessions, including:
//! - Editing drafts and publishing immutable versions
//! - Starting sessions and feeding them customer and agent events
//! - Serializing the events of each session through its own process
//! - Persisting events and logs, and graceful shutdown

mod monitor;
#[cfg(test)]
mod tests;

use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

use crate::{
    ChannelEvent, ChannelOptions, ChatflowError, Config, FlowDefinition, GraphModel, Result, Schedule, Session, ShareLock,
    common::{Queue, Shutdown},
    dispatcher::TurnReport,
    flow::FlowRegistry,
    runtime::{Channel, Clock, Services, SessionCommand, SessionProcess, Transport},
    store::{Store, data},
    utils,
};

use monitor::Monitor;

/// Size of the queue for retired process notifications.
const PROCESS_DONE_QUEUE_SIZE: usize = 1024;

pub type EventRecord = data::Event;
pub type LogRecord = data::Log;

/// The chat flow engine.
///
/// Every entry point that moves a session is `async` and resolves once the
/// resulting turn has been written: paused, handed off, closed or halted.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().transport(Arc::new(MyBackend)).build()?;
/// engine.launch();
///
/// let flow = engine.create_flow("atendimento")?;
/// engine.save_draft(&flow.id, GraphModel::from_json(json_str)?)?;
/// engine.publish(&flow.id)?;
///
/// let report = engine.start_session(&flow.id).await?;
/// let report = engine.submit_user_text(&report.session.id, "12345678900").await?;
/// ```
pub struct Engine {
    /// Store, registry, channel and adapters shared with every session.
    services: Services,
    /// Background monitor for event persistence.
    monitor: Monitor,
    /// Queue for retired process notifications.
    procs_done_queue: Arc<Queue<String>>,
    /// Live session processes.
    procs: ShareLock<HashMap<String, Arc<SessionProcess>>>,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Tokio runtime for async task execution.
    runtime: Handle,
    /// Runtime created by the builder, kept alive with the engine.
    _owned_runtime: Option<Arc<Runtime>>,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Config,
        store: Store,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
        runtime: Handle,
        owned_runtime: Option<Arc<Runtime>>,
    ) -> Self {
        let store = Arc::new(store);
        let channel = Arc::new(Channel::new(runtime.clone()));
        let monitor = Monitor::new(store.clone(), channel.clone(), runtime.clone());

        let services = Services {
            registry: Arc::new(FlowRegistry::new(store.clone())),
            store,
            channel,
            transport,
            clock,
            http,
            config: Arc::new(config),
        };

        Self {
            services,
            monitor,
            procs_done_queue: Queue::new(PROCESS_DONE_QUEUE_SIZE),
            procs: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            _owned_runtime: owned_runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Starts the engine and begins processing events.
    ///
    /// This method:
    /// - Starts the event monitor for persistence
    /// - Begins listening on the event channel
    /// - Spawns a background task to drop retired session processes
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        // Register handlers first, then start listening
        self.monitor.monitor();
        self.services.channel.listen();

        let procs_done_queue = self.procs_done_queue.clone();
        let shutdown = self.shutdown.clone();
        let procs = self.procs.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(sid) = procs_done_queue.next_async() => {
                        let mut procs = procs.write().unwrap_or_else(PoisonError::into_inner);
                        if procs.get(&sid).is_some_and(|p| p.is_retired()) {
                            procs.remove(&sid);
                        }
                    }
                }
            }
        });
        info!("engine launched");
    }

    /// Gracefully shuts down the engine.
    ///
    /// Running turns are aborted. A session cut mid-turn keeps its
    /// `pending_node_id` and can be picked up with [`Engine::recover_session`].
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        for proc in self.procs.read().unwrap_or_else(PoisonError::into_inner).values() {
            proc.stop();
        }
        self.services.channel.shutdown();
        info!("engine shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Creates a flow whose draft holds a single start node.
    pub fn create_flow(
        &self,
        name: &str,
    ) -> Result<FlowDefinition> {
        self.services.registry.create_flow(name, self.now())
    }

    pub fn save_draft(
        &self,
        flow_id: &str,
        graph: GraphModel,
    ) -> Result<FlowDefinition> {
        self.services.registry.save_draft(flow_id, graph, self.now())
    }

    /// Compiles the draft and makes it the published graph.
    ///
    /// New sessions start on it at once. Paused sessions switch at their next
    /// reply or keep their version, depending on `engine.resume_binding`.
    pub fn publish(
        &self,
        flow_id: &str,
    ) -> Result<FlowDefinition> {
        self.services.registry.publish(flow_id, self.now())
    }

    pub fn get_flow(
        &self,
        flow_id: &str,
    ) -> Result<FlowDefinition> {
        self.services.registry.get(flow_id)
    }

    pub fn save_schedule(
        &self,
        schedule: &Schedule,
    ) -> Result<()> {
        self.services.store.save_schedule(schedule, self.now())
    }

    /// Opens a session on the published graph and runs it to its first pause.
    pub async fn start_session(
        &self,
        flow_id: &str,
    ) -> Result<TurnReport> {
        self.ensure_running()?;
        let flow = self.services.registry.published(flow_id)?;
        let session = Session::new(utils::session_id(), flow_id.to_string(), flow.version(), self.now());
        self.services.store.create_session(&session)?;
        info!("session {} started on {}@{}", session.id, flow_id, flow.version());

        self.dispatch(&session.id, SessionCommand::Start).await
    }

    /// Delivers customer text.
    ///
    /// Resumes an `input` node, or a `template` node when the text names one
    /// of its buttons. Sessions owned by a human only get the message
    /// appended.
    pub async fn submit_user_text(
        &self,
        sid: &str,
        text: &str,
    ) -> Result<TurnReport> {
        self.dispatch(sid, SessionCommand::UserText(text.to_string())).await
    }

    pub async fn submit_button_click(
        &self,
        sid: &str,
        button_id: &str,
        label: &str,
    ) -> Result<TurnReport> {
        self.dispatch(
            sid,
            SessionCommand::ButtonClick {
                id: button_id.to_string(),
                label: label.to_string(),
            },
        )
        .await
    }

    /// Closes the session at once, cancelling a turn waiting on a delay or an
    /// outbound call.
    pub async fn force_close_session(
        &self,
        sid: &str,
    ) -> Result<TurnReport> {
        if let Some(proc) = self.procs.read().unwrap_or_else(PoisonError::into_inner).get(sid) {
            proc.abort_current();
        }
        self.dispatch(sid, SessionCommand::Close).await
    }

    /// An agent takes a queued session.
    pub async fn assign_agent(
        &self,
        sid: &str,
        agent_id: &str,
    ) -> Result<TurnReport> {
        self.dispatch(sid, SessionCommand::AssignAgent(agent_id.to_string())).await
    }

    /// Hands a queued session back to the published graph, at `node_id` or at
    /// the start node.
    pub async fn return_to_bot(
        &self,
        sid: &str,
        node_id: Option<&str>,
    ) -> Result<TurnReport> {
        self.dispatch(sid, SessionCommand::ReturnToBot(node_id.map(str::to_string))).await
    }

    /// Re-runs the node a turn was about to execute when it was cut off.
    pub async fn recover_session(
        &self,
        sid: &str,
    ) -> Result<TurnReport> {
        self.dispatch(sid, SessionCommand::Recover).await
    }

    pub fn get_session(
        &self,
        sid: &str,
    ) -> Result<Session> {
        self.services.store.load_session(sid)
    }

    /// Subscribes to session and node events.
    pub fn channel(
        &self,
        options: ChannelOptions,
    ) -> Result<ChannelEvent> {
        ChannelEvent::channel(self.services.channel.clone(), options)
    }

    /// Persisted events of a session, oldest first.
    pub fn session_events(
        &self,
        sid: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>> {
        self.services.store.session_events(sid, limit)
    }

    /// Persisted node logs of a session, oldest first.
    pub fn session_logs(
        &self,
        sid: &str,
        limit: usize,
    ) -> Result<Vec<LogRecord>> {
        self.services.store.session_logs(sid, limit)
    }

    fn now(&self) -> i64 {
        self.services.clock.now_millis()
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(ChatflowError::Engine("Engine is not running".to_string()));
        }
        Ok(())
    }

    /// Hands `cmd` to the session's process and waits for the reply.
    async fn dispatch(
        &self,
        sid: &str,
        cmd: SessionCommand,
    ) -> Result<TurnReport> {
        self.ensure_running()?;
        if !self.services.store.sessions()?.exists(sid)? {
            return Err(ChatflowError::Session(format!("session '{}' not found", sid)));
        }

        loop {
            self.ensure_running()?;
            let proc = self.process(sid);
            if let Some(reply) = proc.enqueue(cmd.clone())? {
                return reply.await.map_err(|_| ChatflowError::Engine(format!("session '{}' dropped the command", sid)))?;
            }
        }
    }

    /// Live process of `sid`, started on demand.
    fn process(
        &self,
        sid: &str,
    ) -> Arc<SessionProcess> {
        if let Some(proc) = self.procs.read().unwrap_or_else(PoisonError::into_inner).get(sid)
            && !proc.is_retired()
        {
            return proc.clone();
        }

        let mut procs = self.procs.write().unwrap_or_else(PoisonError::into_inner);
        match procs.get(sid) {
            Some(proc) if !proc.is_retired() => proc.clone(),
            _ => {
                debug!("starting process for session {}", sid);
                let proc = SessionProcess::new(sid, self.services.clone(), self.procs_done_queue.clone(), self.runtime.clone());
                proc.start();
                procs.insert(sid.to_string(), proc.clone());
                proc
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
