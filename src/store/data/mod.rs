mod event;
mod flow;
mod log;
mod schedule;
mod session;
mod version;

pub use event::Event;
pub use flow::Flow;
pub use log::Log;
pub use schedule::Schedule;
pub use session::Session;
pub use version::FlowVersion;
