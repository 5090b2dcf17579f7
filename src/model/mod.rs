mod edge;
mod flow;
mod node;
mod schedule;
mod session;

pub use edge::EdgeModel;
pub use flow::{FlowDefinition, GraphModel};
pub use node::NodeModel;
pub use schedule::{DayWindow, Schedule};
pub use session::{Button, ChatMessage, Halt, HaltKind, Sender, Session, SessionStatus};
