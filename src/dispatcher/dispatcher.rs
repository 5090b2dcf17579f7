//! Turn dispatcher for walking a compiled flow.
//!
//! The dispatcher is responsible for:
//! - Running one node at a time, starting at a node or resuming a paused one
//! - Applying the node's messages and variable changes to the session
//! - Writing the session after every node and notifying the transport
//! - Turning routing, script and outbound-call failures into a session halt

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    ChatMessage, ChatflowError, Halt, HaltKind, Result, Sender, Session, SessionStatus,
    common::Vars,
    events::{ChatEvent, Message, NodeEvent, SessionEvent},
    flow::{
        actions::{BotMessage, ResumeEvent, Transition},
        node::NodeId,
    },
    runtime::{Channel, Context, Transport},
    utils,
};

/// Where a turn begins.
#[derive(Debug, Clone)]
pub enum Step {
    /// Execute the node from scratch.
    Run(NodeId),
    /// Deliver a reply to the node the session is paused on.
    Resume(NodeId, ResumeEvent),
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Waiting on an `input` or `template` node.
    Paused,
    /// Handed to a human queue.
    Handoff,
    Closed,
    /// Stopped on a diagnostic, see `Session::halt`.
    Halted,
    /// Reached a node with no way forward.
    Ended,
    /// Cancelled while running. Nothing was written after the cancel.
    Aborted,
    /// User text for a session owned by a human. Only appended.
    Relayed,
    /// An agent picked the session up.
    Assigned,
}

/// Result of one entry-point call.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub session: Session,
    pub outcome: TurnOutcome,
    /// nodes executed
    pub steps: usize,
}

impl TurnReport {
    pub fn new(
        session: Session,
        outcome: TurnOutcome,
        steps: usize,
    ) -> Self {
        Self {
            session,
            outcome,
            steps,
        }
    }
}

/// Where a node sent the traversal.
enum Route {
    Continue(NodeId),
    End,
    Pause,
    Handoff {
        queue: String,
        reason: Option<String>,
    },
    Close,
    Halt {
        kind: HaltKind,
        message: String,
        retryable: bool,
    },
}

impl Route {
    fn halt(e: ChatflowError) -> Self {
        Route::Halt {
            kind: HaltKind::GraphIntegrity,
            message: e.to_string(),
            retryable: true,
        }
    }
}

/// Executes one turn of a session on a compiled flow.
pub struct Dispatcher {
    /// Context of the turn: graph, variables, abort signal.
    ctx: Arc<Context>,
    /// Event bus.
    channel: Arc<Channel>,
    /// Chat backend notified after each write.
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<Context>,
        channel: Arc<Channel>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            ctx,
            channel,
            transport,
        }
    }

    /// Walk the graph from `step` until the session pauses, leaves the graph,
    /// halts or runs out of edges.
    ///
    /// Graph, script and outbound-call failures never come back as `Err`: they
    /// are recorded as a halt with a diagnostic bot message. `Err` means the
    /// reply did not fit the paused node, or the store failed.
    pub async fn run_turn(
        &self,
        mut session: Session,
        step: Step,
    ) -> Result<TurnReport> {
        let max_steps = self.ctx.settings().max_steps_per_turn;
        let mut steps = 0;
        let mut step = step;

        session.halt = None;
        session.current_node_id = None;

        loop {
            let (nid, event) = match step {
                Step::Run(nid) => (nid, None),
                Step::Resume(nid, event) => (nid, Some(event)),
            };

            if steps >= max_steps {
                let message = format!("turn stopped after {} nodes without waiting for the customer", max_steps);
                return self.halt(session, &nid, HaltKind::StepBudget, message, false, steps).await;
            }
            steps += 1;

            let flow = self.ctx.flow().clone();
            let Some(node) = flow.get_node(&nid) else {
                let message = format!("node '{}' not found in flow '{}'", nid, flow.id());
                return self.halt(session, &nid, HaltKind::GraphIntegrity, message, false, steps).await;
            };

            debug!("dispatcher::run({}, {}, {})", self.ctx.sid(), nid, node.kind.as_ref());
            self.emit(&nid, ChatEvent::Node(NodeEvent::Running(self.ctx.now_millis())));

            let before = self.ctx.vars_snapshot();
            let ctx = self.ctx.clone();
            let run = async {
                match event {
                    None => node.action.run(ctx, nid.clone()).await,
                    Some(event) => node.action.resume(ctx, nid.clone(), event).await,
                }
            };

            let result = tokio::select! {
                biased;
                _ = self.ctx.wait_abort() => None,
                r = run => Some(r),
            };
            let Some(result) = result else {
                info!("session {} aborted while running node {}", self.ctx.sid(), nid);
                self.emit(&nid, ChatEvent::Node(NodeEvent::Stopped(self.ctx.now_millis())));
                return Ok(TurnReport::new(session, TurnOutcome::Aborted, steps));
            };

            let output = match result {
                Ok(output) => output,
                Err(e @ ChatflowError::Session(_)) => return Err(e),
                Err(e) => {
                    self.emit(&nid, ChatEvent::Node(NodeEvent::Error(e.to_string())));
                    let kind = match e {
                        ChatflowError::Script(_) => HaltKind::Script,
                        _ => HaltKind::GraphIntegrity,
                    };
                    return self.halt(session, &nid, kind, e.to_string(), true, steps).await;
                }
            };

            let route = self.route(&nid, output.transition);

            let after = self.ctx.vars_snapshot();
            let delta = delta(&before, &after);
            session.variables = after;

            let appended = output.messages.into_iter().map(|m| self.bot_message(m)).collect::<Vec<_>>();
            session.messages.extend(appended.iter().cloned());

            session.pending_node_id = None;
            match &route {
                Route::Continue(next) => session.pending_node_id = Some(next.clone()),
                Route::Pause => session.current_node_id = Some(nid.clone()),
                Route::Handoff {
                    queue, ..
                } => {
                    session.status = SessionStatus::Waiting;
                    session.queue = Some(queue.clone());
                }
                Route::Close => session.status = SessionStatus::Closed,
                Route::End | Route::Halt { .. } => {}
            }

            if !self.commit(&mut session, &appended, &delta).await? {
                self.emit(&nid, ChatEvent::Node(NodeEvent::Stopped(self.ctx.now_millis())));
                return Ok(TurnReport::new(session, TurnOutcome::Aborted, steps));
            }
            self.emit(&nid, ChatEvent::Node(NodeEvent::Succeeded(self.ctx.now_millis())));

            match route {
                Route::Continue(next) => step = Step::Run(next),
                Route::End => {
                    debug!("session {} ended at node {}", session.id, nid);
                    self.emit(&nid, ChatEvent::Session(SessionEvent::Ended));
                    return Ok(TurnReport::new(session, TurnOutcome::Ended, steps));
                }
                Route::Pause => {
                    self.emit(&nid, ChatEvent::Session(SessionEvent::Paused));
                    return Ok(TurnReport::new(session, TurnOutcome::Paused, steps));
                }
                Route::Handoff {
                    queue,
                    reason,
                } => {
                    info!("session {} handed to queue {}", session.id, queue);
                    if let Err(e) = self.transport.transfer_to_queue(&session.id, &queue, reason.as_deref()).await {
                        warn!("transport::transfer_to_queue({}) failed: {}", session.id, e);
                    }
                    self.emit(&nid, ChatEvent::Session(SessionEvent::Handoff(queue)));
                    return Ok(TurnReport::new(session, TurnOutcome::Handoff, steps));
                }
                Route::Close => {
                    info!("session {} closed by node {}", session.id, nid);
                    if let Err(e) = self.transport.close_session(&session.id).await {
                        warn!("transport::close_session({}) failed: {}", session.id, e);
                    }
                    self.emit(&nid, ChatEvent::Session(SessionEvent::Closed));
                    return Ok(TurnReport::new(session, TurnOutcome::Closed, steps));
                }
                Route::Halt {
                    kind,
                    message,
                    retryable,
                } => return self.halt(session, &nid, kind, message, retryable, steps).await,
            }
        }
    }

    fn route(
        &self,
        nid: &str,
        transition: Transition,
    ) -> Route {
        let flow = self.ctx.flow();
        match transition {
            Transition::Next(handle) => match flow.next(nid, &handle) {
                Ok(Some(next)) => Route::Continue(next),
                Ok(None) => Route::End,
                Err(e) => Route::halt(e),
            },
            Transition::Branch(handle) => match flow.next(nid, &handle) {
                Ok(Some(next)) => Route::Continue(next),
                Ok(None) => Route::halt(ChatflowError::Graph(format!("node '{}' has no '{}' route", nid, handle))),
                Err(e) => Route::halt(e),
            },
            Transition::Only => match flow.next_single(nid) {
                Ok(Some(next)) => Route::Continue(next),
                Ok(None) => Route::End,
                Err(e) => Route::halt(e),
            },
            Transition::Jump(target) => Route::Continue(target),
            Transition::Pause => Route::Pause,
            Transition::Handoff {
                queue,
                reason,
            } => Route::Handoff {
                queue,
                reason,
            },
            Transition::Close => Route::Close,
            Transition::Unmatched(message) => Route::Halt {
                kind: HaltKind::Unmatched,
                message,
                retryable: false,
            },
        }
    }

    /// Record the halt, tell the customer, and end the turn.
    async fn halt(
        &self,
        mut session: Session,
        nid: &NodeId,
        kind: HaltKind,
        message: String,
        retryable: bool,
        steps: usize,
    ) -> Result<TurnReport> {
        warn!("session {} halted at node {} ({}): {}", session.id, nid, kind.as_ref(), message);

        let diagnostic = self.bot_message(BotMessage::text(format!("{} {}", self.ctx.messages().diagnostic_prefix, message)));
        session.messages.push(diagnostic.clone());
        session.halt = Some(Halt {
            node_id: nid.clone(),
            kind,
            message: message.clone(),
            retryable,
        });
        session.pending_node_id = None;
        session.current_node_id = None;

        if !self.commit(&mut session, std::slice::from_ref(&diagnostic), &Vars::new()).await? {
            return Ok(TurnReport::new(session, TurnOutcome::Aborted, steps));
        }
        self.emit(nid, ChatEvent::Session(SessionEvent::Halted(message)));
        Ok(TurnReport::new(session, TurnOutcome::Halted, steps))
    }

    /// Write the session, then forward the new messages and variables.
    ///
    /// Returns `false` without writing when the turn was aborted or the
    /// session got closed by someone else in the meantime.
    async fn commit(
        &self,
        session: &mut Session,
        appended: &[ChatMessage],
        delta: &Vars,
    ) -> Result<bool> {
        if self.ctx.is_aborted() {
            return Ok(false);
        }
        if self.ctx.store().session_status(&session.id)? == SessionStatus::Closed {
            info!("session {} was closed during the turn, dropping its writes", session.id);
            return Ok(false);
        }

        session.update_time = self.ctx.now_millis();
        self.ctx.store().save_session(session)?;

        for message in appended {
            if let Err(e) = self.transport.append_message(&session.id, message).await {
                warn!("transport::append_message({}) failed: {}", session.id, e);
            }
        }
        if !delta.is_empty()
            && let Err(e) = self.transport.persist_variables(&session.id, delta).await
        {
            warn!("transport::persist_variables({}) failed: {}", session.id, e);
        }
        Ok(true)
    }

    fn bot_message(
        &self,
        message: BotMessage,
    ) -> ChatMessage {
        ChatMessage {
            id: utils::longid(),
            sender: Sender::Bot,
            text: message.text,
            buttons: message.buttons,
            timestamp: self.ctx.now_millis(),
        }
    }

    fn emit(
        &self,
        nid: &str,
        event: ChatEvent,
    ) {
        self.channel.emit(Message {
            sid: self.ctx.sid().to_string(),
            nid: nid.to_string(),
            event,
        });
    }
}

/// Keys whose value changed between two snapshots.
fn delta(
    before: &Vars,
    after: &Vars,
) -> Vars {
    let mut delta = Vars::new();
    for (k, v) in after.iter() {
        if before.get::<Value>(k).as_ref() != Some(v) {
            delta.insert(k.clone(), v.clone());
        }
    }
    delta
}
