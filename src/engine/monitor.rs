use std::sync::Arc;

use tokio::{runtime::Handle, sync::broadcast::error::RecvError};
use tracing::warn;

use crate::{
    runtime::Channel,
    store::{Store, data},
    utils,
};

/// Writes every event and log line of the channel into the store.
pub struct Monitor {
    store: Arc<Store>,
    channel: Arc<Channel>,

    runtime: Handle,
}

impl Monitor {
    pub fn new(
        store: Arc<Store>,
        channel: Arc<Channel>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            channel,
            runtime,
        }
    }

    pub fn monitor(&self) {
        let store = self.store.clone();
        let mut event_queue = self.channel.event_queue().subscribe();

        self.runtime.spawn(async move {
            loop {
                let event = match event_queue.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!("monitor dropped {} events", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let row = data::Event {
                    id: utils::longid(),
                    sid: event.sid.clone(),
                    nid: event.nid.clone(),
                    name: event.event.name(),
                    message: format!("{:?}", event.event),
                    timestamp: utils::time::time_millis(),
                };
                if let Err(e) = store.events().and_then(|events| events.create(&row)) {
                    warn!("monitor failed to persist event {}: {}", row.name, e);
                }
            }
        });

        let store = self.store.clone();
        let mut log_queue = self.channel.log_queue().subscribe();

        self.runtime.spawn(async move {
            loop {
                let log = match log_queue.recv().await {
                    Ok(log) => log,
                    Err(RecvError::Lagged(n)) => {
                        warn!("monitor dropped {} logs", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let row = data::Log {
                    id: utils::longid(),
                    sid: log.sid.clone(),
                    nid: log.nid.clone(),
                    content: log.content.clone(),
                    timestamp: log.timestamp,
                };
                if let Err(e) = store.logs().and_then(|logs| logs.create(&row)) {
                    warn!("monitor failed to persist log of {}: {}", row.sid, e);
                }
            }
        });
    }
}
