mod channel;
mod clock;
mod context;
mod process;
mod transport;
mod variables;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::Context;
pub(crate) use process::Services;
pub use process::{SessionCommand, SessionProcess};
pub use transport::{NoopTransport, Transport};
pub use variables::VariableContext;
