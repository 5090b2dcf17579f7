//! # Chatflow
//!
//! Chatflow is an embeddable conversation flow engine for multi-tenant support
//! chat, written in Rust.
//! It walks an authored graph of nodes for each customer conversation, pausing
//! on questions, calling out to HTTP services and handing sessions to human
//! queues.
//!
//! ## Core Features
//!
//! - **Flow Graphs**: Drafts are compiled on publish into immutable, versioned graphs
//! - **Per-Session Serialization**: Every session is driven by a single command queue
//! - **Incremental Persistence**: The session is written after every node
//! - **Pluggable Storage**: In-memory storage (testing) and PostgreSQL (production)
//! - **Sandboxed Scripts**: JavaScript nodes run in a bounded QuickJS runtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatflow::{EngineBuilder, GraphModel};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch();
//!
//! let flow = engine.create_flow("atendimento")?;
//! engine.save_draft(&flow.id, GraphModel::from_json(json_str)?)?;
//! engine.publish(&flow.id)?;
//!
//! let report = engine.start_session(&flow.id).await?;
//! let report = engine.submit_user_text(&report.session.id, "Oi").await?;
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod evaluator;
mod events;
mod flow;
mod model;
mod runtime;
mod store;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::{Config, EngineSettings, MessageSettings, PostgresConfig, ResumeBinding, StoreConfig, StoreType};
pub use dispatcher::{TurnOutcome, TurnReport};
pub use engine::{Engine, EventRecord, LogRecord};
pub use error::ChatflowError;
pub use events::{ChatEvent, Event, Log, Message, NodeEvent, SessionEvent};
pub use model::*;
pub use runtime::{ChannelEvent, ChannelOptions, Clock, FixedClock, NoopTransport, SystemClock, Transport};

/// Result type alias for Chatflow operations.
pub type Result<T> = std::result::Result<T, ChatflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
