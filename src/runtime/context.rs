use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    Config, EngineSettings, MessageSettings, ShareLock,
    common::{Shutdown, Vars},
    events::Log,
    evaluator::ScriptLimits,
    flow::{Flow, node::NodeId},
    runtime::{Channel, Clock, VariableContext},
    store::Store,
};

/// Everything an action can reach while one session turn runs.
#[derive(Clone)]
pub struct Context {
    sid: String,
    flow: Arc<Flow>,
    vars: ShareLock<VariableContext>,
    channel: Arc<Channel>,
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
    config: Arc<Config>,

    abort: Arc<Shutdown>,
}

#[allow(clippy::too_many_arguments)]
impl Context {
    pub fn new(
        sid: String,
        flow: Arc<Flow>,
        vars: Vars,
        channel: Arc<Channel>,
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
        config: Arc<Config>,
        abort: Arc<Shutdown>,
    ) -> Self {
        Self {
            sid,
            flow,
            vars: Arc::new(RwLock::new(VariableContext::new(vars))),
            channel,
            store,
            clock,
            http,
            config,
            abort,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.config.engine
    }

    pub fn messages(&self) -> &MessageSettings {
        &self.config.messages
    }

    pub fn script_limits(&self) -> ScriptLimits {
        ScriptLimits {
            timeout: std::time::Duration::from_millis(self.config.engine.script_timeout_ms),
            memory_limit: self.config.engine.script_memory_limit,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn get_var(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.vars.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn set_var(
        &self,
        name: &str,
        value: Value,
    ) {
        self.vars.write().unwrap_or_else(PoisonError::into_inner).set(name, value);
    }

    pub fn merge_vars(
        &self,
        delta: Vars,
    ) {
        self.vars.write().unwrap_or_else(PoisonError::into_inner).merge(delta);
    }

    /// Run `f` against the variables without copying them.
    pub fn with_vars<R>(
        &self,
        f: impl FnOnce(&VariableContext) -> R,
    ) -> R {
        f(&self.vars.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn interpolate(
        &self,
        text: &str,
    ) -> String {
        self.with_vars(|v| v.interpolate(text))
    }

    pub fn interpolate_json(
        &self,
        value: &Value,
    ) -> Value {
        self.with_vars(|v| v.interpolate_json(value))
    }

    pub fn vars_snapshot(&self) -> Vars {
        self.with_vars(|v| v.snapshot())
    }

    pub fn emit_log(
        &self,
        nid: &NodeId,
        content: String,
    ) {
        self.channel.emit_log(Log {
            sid: self.sid.clone(),
            nid: nid.clone(),
            content,
            timestamp: self.clock.now_millis(),
        });
    }

    /// Set once the turn is cancelled (force close or engine shutdown).
    pub fn is_aborted(&self) -> bool {
        self.abort.is_terminated()
    }

    pub fn wait_abort(&self) -> impl Future<Output = ()> + Send + 'static {
        self.abort.wait()
    }
}

#[cfg(test)]
impl Context {
    /// Context over `graph`, a fresh in-memory store and a clock frozen on
    /// monday 2024-03-04 10:00 UTC.
    pub(crate) fn for_test(
        graph: Value,
        vars: Value,
    ) -> Arc<Self> {
        use chrono::TimeZone;

        use crate::{
            GraphModel,
            runtime::FixedClock,
            store::{DbStore, MemStore},
        };

        let model: GraphModel = serde_json::from_value(graph).unwrap();
        let flow = Arc::new(Flow::compile("flow", 1, &model).unwrap());
        let store = Store::new();
        MemStore::new().init(&store).unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap());

        Arc::new(Self::new(
            "sess-1".to_string(),
            flow,
            Vars::from(vars),
            Arc::new(Channel::new(tokio::runtime::Handle::current())),
            Arc::new(store),
            Arc::new(clock),
            reqwest::Client::new(),
            Arc::new(Config::default()),
            Arc::new(Shutdown::new()),
        ))
    }

    pub(crate) fn abort(&self) {
        self.abort.shutdown();
    }
}
