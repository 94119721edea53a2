pub mod channel;
pub mod connection;
pub mod error;
pub mod jupyter;
pub mod kernel;
pub mod message;
pub mod process;
pub mod spec;

pub use error::KernelError;
pub use jupyter::JupyterKernel;
pub use kernel::Kernel;
pub use message::{Header, KernelMessage, MsgId};
pub use spec::KernelSpec;
