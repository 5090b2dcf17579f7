use std::sync::{Arc, Mutex, PoisonError};

use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, info, warn};

use crate::{
    ChatMessage, ChatflowError, Config, ResumeBinding, Result, Sender, Session, SessionStatus,
    common::{Queue, Shutdown},
    dispatcher::{Dispatcher, Step, TurnOutcome, TurnReport},
    events::{ChatEvent, Message, SessionEvent},
    flow::{
        Flow, FlowRegistry,
        actions::ResumeEvent,
        node::{NodeId, NodeKind},
    },
    runtime::{Channel, Clock, Context, Transport},
    store::Store,
    utils,
};

const COMMAND_QUEUE_SIZE: usize = 100;

/// Everything a session process needs from the engine.
#[derive(Clone)]
pub(crate) struct Services {
    pub store: Arc<Store>,
    pub registry: Arc<FlowRegistry>,
    pub channel: Arc<Channel>,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}

/// Request addressed to one session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Run the graph from its start node.
    Start,
    UserText(String),
    ButtonClick {
        id: String,
        label: String,
    },
    /// Close the session whatever it is doing.
    Close,
    /// Re-run the node an interrupted turn was about to execute.
    Recover,
    AssignAgent(String),
    /// Give a queued session back to the graph, at a node or at start.
    ReturnToBot(Option<NodeId>),
}

type Reply = oneshot::Sender<Result<TurnReport>>;

/// Serializes every command of one session.
///
/// Commands go through a bounded queue drained by a single task, so two
/// events for the same session never run at the same time. The task retires
/// as soon as its queue is empty after a command, paused sessions included;
/// the engine starts a fresh process on the next command.
pub struct SessionProcess {
    sid: String,
    services: Services,
    command_queue: Arc<Queue<(SessionCommand, Reply)>>,
    /// set once the task stopped taking commands
    retired: Mutex<bool>,
    /// abort signal of the running turn
    current_abort: Mutex<Option<Arc<Shutdown>>>,
    /// receives the session id when the process retires
    done_queue: Arc<Queue<String>>,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl SessionProcess {
    pub(crate) fn new(
        sid: &str,
        services: Services,
        done_queue: Arc<Queue<String>>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            sid: sid.to_string(),
            services,
            command_queue: Queue::new(COMMAND_QUEUE_SIZE),
            retired: Mutex::new(false),
            current_abort: Mutex::new(None),
            done_queue,
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let proc = self.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = proc.shutdown.wait() => break,
                    cmd = proc.command_queue.next_async() => {
                        let Some((cmd, reply)) = cmd else {
                            break;
                        };
                        let result = proc.handle(cmd).await;
                        let _ = reply.send(result);
                        if proc.retire_if_idle() {
                            debug!("session process {} retired", proc.sid);
                            let _ = proc.done_queue.try_send(proc.sid.clone());
                            return;
                        }
                    }
                }
            }

            *proc.retired.lock().unwrap_or_else(PoisonError::into_inner) = true;
            while let Some((_, reply)) = proc.command_queue.try_next() {
                let _ = reply.send(Err(ChatflowError::Engine("engine is shutting down".to_string())));
            }
        });
    }

    /// Queue a command.
    ///
    /// `Ok(None)` when the process already retired; the caller should start a
    /// new one.
    pub(crate) fn enqueue(
        &self,
        cmd: SessionCommand,
    ) -> Result<Option<oneshot::Receiver<Result<TurnReport>>>> {
        let retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        if *retired {
            return Ok(None);
        }
        let (tx, rx) = oneshot::channel();
        self.command_queue.try_send((cmd, tx)).map_err(|_| ChatflowError::Queue(format!("too many pending events for session '{}'", self.sid)))?;
        Ok(Some(rx))
    }

    pub fn is_retired(&self) -> bool {
        *self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retire_if_idle(&self) -> bool {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        if self.command_queue.is_empty() {
            *retired = true;
        }
        *retired
    }

    /// Cancel the running turn, if any. Its pending writes are dropped.
    pub fn abort_current(&self) {
        if let Some(abort) = self.current_abort.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            abort.shutdown();
        }
    }

    pub fn stop(&self) {
        self.abort_current();
        self.shutdown.shutdown();
    }

    async fn handle(
        &self,
        cmd: SessionCommand,
    ) -> Result<TurnReport> {
        let session = self.services.store.load_session(&self.sid)?;
        if session.is_closed() {
            return Err(ChatflowError::Session(format!("session '{}' is closed", self.sid)));
        }

        match cmd {
            SessionCommand::Start => {
                let flow = self.services.registry.version(&session.flow_id, session.flow_version)?;
                let start = flow.start_node().clone();
                self.emit(&start, SessionEvent::Started);
                self.turn(session, flow, Step::Run(start)).await
            }
            SessionCommand::UserText(text) => self.user_text(session, text).await,
            SessionCommand::ButtonClick {
                id,
                label,
            } => self.button_click(session, id, label).await,
            SessionCommand::Close => self.close(session).await,
            SessionCommand::Recover => {
                let Some(nid) = session.pending_node_id.clone() else {
                    return Err(ChatflowError::Session(format!("session '{}' has no interrupted turn", self.sid)));
                };
                info!("recovering session {} at node {}", self.sid, nid);
                let flow = self.services.registry.version(&session.flow_id, session.flow_version)?;
                self.turn(session, flow, Step::Run(nid)).await
            }
            SessionCommand::AssignAgent(agent_id) => self.assign_agent(session, agent_id),
            SessionCommand::ReturnToBot(nid) => self.return_to_bot(session, nid).await,
        }
    }

    async fn user_text(
        &self,
        mut session: Session,
        text: String,
    ) -> Result<TurnReport> {
        if matches!(session.status, SessionStatus::Waiting | SessionStatus::Open) {
            self.record(&mut session, text).await?;
            return Ok(TurnReport::new(session, TurnOutcome::Relayed, 0));
        }

        if let Some(nid) = session.current_node_id.clone() {
            let flow = self.resume_flow(&session, &nid)?;
            self.record(&mut session, text.clone()).await?;
            self.emit(&nid, SessionEvent::Resumed);
            return self.turn(session, flow, Step::Resume(nid, ResumeEvent::UserText(text))).await;
        }

        if let Some(halt) = session.halt.clone()
            && halt.retryable
        {
            let flow = self.resume_flow(&session, &halt.node_id)?;
            self.record(&mut session, text).await?;
            info!("retrying node {} of session {}", halt.node_id, self.sid);
            self.emit(&halt.node_id, SessionEvent::Resumed);
            return self.turn(session, flow, Step::Run(halt.node_id)).await;
        }

        Err(ChatflowError::Session(format!("session '{}' is not waiting for a reply", self.sid)))
    }

    async fn button_click(
        &self,
        mut session: Session,
        id: String,
        label: String,
    ) -> Result<TurnReport> {
        let Some(nid) = session.current_node_id.clone().filter(|_| session.is_paused()) else {
            return Err(ChatflowError::Session(format!("session '{}' is not waiting for a reply", self.sid)));
        };
        let flow = self.resume_flow(&session, &nid)?;
        match flow.get_node(&nid) {
            Some(node) if node.kind == NodeKind::Template => {}
            _ => return Err(ChatflowError::Session(format!("node '{}' does not offer buttons", nid))),
        }

        self.record(&mut session, label.clone()).await?;
        self.emit(&nid, SessionEvent::Resumed);
        self.turn(
            session,
            flow,
            Step::Resume(nid, ResumeEvent::ButtonClick {
                id,
                label,
            }),
        )
        .await
    }

    async fn close(
        &self,
        mut session: Session,
    ) -> Result<TurnReport> {
        session.status = SessionStatus::Closed;
        session.current_node_id = None;
        session.pending_node_id = None;
        session.update_time = self.services.clock.now_millis();
        self.services.store.save_session(&session)?;
        info!("session {} force closed", self.sid);

        if let Err(e) = self.services.transport.close_session(&self.sid).await {
            warn!("transport::close_session({}) failed: {}", self.sid, e);
        }
        self.emit("", SessionEvent::Closed);
        Ok(TurnReport::new(session, TurnOutcome::Closed, 0))
    }

    fn assign_agent(
        &self,
        mut session: Session,
        agent_id: String,
    ) -> Result<TurnReport> {
        if !matches!(session.status, SessionStatus::Waiting | SessionStatus::Open) {
            return Err(ChatflowError::Session(format!("session '{}' is not queued", self.sid)));
        }
        session.status = SessionStatus::Open;
        session.agent_id = Some(agent_id);
        session.update_time = self.services.clock.now_millis();
        self.services.store.save_session(&session)?;
        Ok(TurnReport::new(session, TurnOutcome::Assigned, 0))
    }

    async fn return_to_bot(
        &self,
        mut session: Session,
        nid: Option<NodeId>,
    ) -> Result<TurnReport> {
        if !matches!(session.status, SessionStatus::Waiting | SessionStatus::Open) {
            return Err(ChatflowError::Session(format!("session '{}' is not queued", self.sid)));
        }
        let flow = self.services.registry.published(&session.flow_id)?;
        let target = nid.unwrap_or_else(|| flow.start_node().clone());
        if flow.get_node(&target).is_none() {
            return Err(ChatflowError::Session(format!("node '{}' not found in flow '{}'", target, session.flow_id)));
        }

        session.status = SessionStatus::Bot;
        session.queue = None;
        session.agent_id = None;
        self.emit(&target, SessionEvent::Resumed);
        self.turn(session, flow, Step::Run(target)).await
    }

    /// Graph a paused session continues on.
    fn resume_flow(
        &self,
        session: &Session,
        nid: &str,
    ) -> Result<Arc<Flow>> {
        let registry = &self.services.registry;
        match self.services.config.engine.resume_binding {
            ResumeBinding::Pinned => registry.version(&session.flow_id, session.flow_version),
            ResumeBinding::Latest => {
                let latest = registry.published(&session.flow_id)?;
                if latest.get_node(nid).is_some() {
                    return Ok(latest);
                }
                debug!("node {} is gone from {}@{}, staying on version {}", nid, session.flow_id, latest.version(), session.flow_version);
                registry.version(&session.flow_id, session.flow_version)
            }
        }
    }

    /// Append a customer message to the transcript.
    async fn record(
        &self,
        session: &mut Session,
        text: String,
    ) -> Result<()> {
        let message = ChatMessage {
            id: utils::longid(),
            sender: Sender::User,
            text,
            buttons: None,
            timestamp: self.services.clock.now_millis(),
        };
        session.messages.push(message.clone());
        session.update_time = message.timestamp;
        self.services.store.save_session(session)?;

        if let Err(e) = self.services.transport.append_message(&self.sid, &message).await {
            warn!("transport::append_message({}) failed: {}", self.sid, e);
        }
        Ok(())
    }

    async fn turn(
        &self,
        mut session: Session,
        flow: Arc<Flow>,
        step: Step,
    ) -> Result<TurnReport> {
        let abort = Arc::new(Shutdown::new());
        *self.current_abort.lock().unwrap_or_else(PoisonError::into_inner) = Some(abort.clone());

        session.flow_version = flow.version();
        let ctx = Arc::new(Context::new(
            self.sid.clone(),
            flow,
            session.variables.clone(),
            self.services.channel.clone(),
            self.services.store.clone(),
            self.services.clock.clone(),
            self.services.http.clone(),
            self.services.config.clone(),
            abort,
        ));
        let dispatcher = Dispatcher::new(ctx, self.services.channel.clone(), self.services.transport.clone());
        let report = dispatcher.run_turn(session, step).await;

        *self.current_abort.lock().unwrap_or_else(PoisonError::into_inner) = None;
        report
    }

    fn emit(
        &self,
        nid: &str,
        event: SessionEvent,
    ) {
        self.services.channel.emit(Message {
            sid: self.sid.clone(),
            nid: nid.to_string(),
            event: ChatEvent::Session(event),
        });
    }
}
