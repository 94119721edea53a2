use std::time::Duration;

use async_trait::async_trait;

use crate::{
    message::{KernelMessage, MsgId},
    KernelError,
};

/// Primitive operations on one compute kernel and its channels.
///
/// Every method takes `&self`: one kernel is shared by the execution worker
/// and the command dispatcher, so implementations synchronize internally.
/// Sequencing (start, connect, await readiness) belongs to the caller.
#[async_trait]
pub trait Kernel: Send + Sync {
    /// Spawns the kernel process.
    async fn start_kernel(&self) -> Result<(), KernelError>;

    /// Replaces the running process with a fresh one launched from the same
    /// spawn configuration. Fails with [`KernelError::NotStarted`] if no
    /// process was ever started.
    async fn restart_kernel(&self) -> Result<(), KernelError>;

    /// Whether a kernel process was started (it may have exited since).
    async fn has_kernel(&self) -> bool;

    async fn start_channels(&self) -> Result<(), KernelError>;

    async fn stop_channels(&self) -> Result<(), KernelError>;

    /// Blocks until the kernel answers on its channels, or `timeout` elapses.
    async fn wait_for_ready(&self, timeout: Duration) -> Result<(), KernelError>;

    /// No-op when there is no process.
    async fn interrupt_kernel(&self) -> Result<(), KernelError>;

    async fn shutdown_kernel(&self) -> Result<(), KernelError>;

    async fn is_alive(&self) -> bool;

    /// Submits code for execution and returns the request's message id.
    async fn execute(&self, code: &str) -> Result<MsgId, KernelError>;

    async fn get_shell_msg(&self, timeout: Duration) -> Result<Option<KernelMessage>, KernelError>;

    async fn get_iopub_msg(&self, timeout: Duration) -> Result<Option<KernelMessage>, KernelError>;
}
