use async_trait::async_trait;

use crate::{ChatMessage, Result, common::Vars};

/// Outbound side of the engine: the chat backend that delivers messages and
/// owns queues.
///
/// Calls are made in order for a session, after the session row has been
/// written. A failing call is logged and the turn goes on, the store stays the
/// source of truth.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn append_message(
        &self,
        sid: &str,
        message: &ChatMessage,
    ) -> Result<()>;

    /// Variables changed by the last node.
    async fn persist_variables(
        &self,
        sid: &str,
        delta: &Vars,
    ) -> Result<()>;

    async fn transfer_to_queue(
        &self,
        sid: &str,
        queue: &str,
        reason: Option<&str>,
    ) -> Result<()>;

    async fn close_session(
        &self,
        sid: &str,
    ) -> Result<()>;
}

/// Transport that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn append_message(
        &self,
        _: &str,
        _: &ChatMessage,
    ) -> Result<()> {
        Ok(())
    }

    async fn persist_variables(
        &self,
        _: &str,
        _: &Vars,
    ) -> Result<()> {
        Ok(())
    }

    async fn transfer_to_queue(
        &self,
        _: &str,
        _: &str,
        _: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    async fn close_session(
        &self,
        _: &str,
    ) -> Result<()> {
        Ok(())
    }
}
