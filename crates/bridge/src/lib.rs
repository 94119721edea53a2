pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod drain;
pub mod emitter;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod session;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use drain::DrainOutcome;
pub use emitter::Emitter;
pub use error::{describe_kernel_error, BridgeError};
pub use protocol::{Command, Event, OutputItem, OutputKind};
pub use queue::{ExecQueue, Request};
pub use session::{Session, SessionState};
