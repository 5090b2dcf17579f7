pub mod actions;
pub mod edge;
#[allow(clippy::module_inception)]
mod flow;
pub mod node;
mod registry;
pub mod template;

pub use flow::Flow;
pub use registry::FlowRegistry;
