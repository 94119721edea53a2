use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use sluice_kernel::{Kernel, KernelError, KernelMessage, MsgId};
use tokio::{sync::watch, time::timeout};

use crate::{emitter::Emitter, error::describe_kernel_error, protocol::Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Ready,
    Restarting,
    Dead,
}

/// Owns the lifecycle of one kernel and reports it as events.
///
/// `start`, `restart` and `shutdown` are serialized by a lifecycle lock, and
/// [`Session::submit`] waits for it. A restart fences the request in flight
/// (its drain sees the session leave `Ready`) and waits for that drain to end
/// before touching the kernel, so the old request's `kernel_dead` always
/// precedes `restarted`.
pub struct Session<K> {
    kernel: K,
    emitter: Emitter,
    ready_timeout: Duration,
    state: Mutex<SessionState>,
    current_cell_id: Mutex<Option<String>>,
    generation: AtomicU64,
    lifecycle: tokio::sync::Mutex<()>,
    in_flight: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K: Kernel> Session<K> {
    pub fn new(kernel: K, emitter: Emitter, ready_timeout: Duration) -> Self {
        Self {
            kernel,
            emitter,
            ready_timeout,
            state: Mutex::new(SessionState::Uninitialized),
            current_cell_id: Mutex::new(None),
            generation: AtomicU64::new(0),
            lifecycle: tokio::sync::Mutex::new(()),
            in_flight: watch::Sender::new(false),
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn emit(&self, event: Event) {
        self.emitter.emit(&event);
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Bumped every time a kernel becomes ready.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn current_cell_id(&self) -> Option<String> {
        lock(&self.current_cell_id).clone()
    }

    pub(crate) fn set_current_cell_id(&self, cell_id: Option<String>) {
        *lock(&self.current_cell_id) = cell_id;
    }

    /// Marks the submitted request as drained.
    pub(crate) fn finish_request(&self) {
        self.set_current_cell_id(None);
        self.in_flight.send_replace(false);
    }

    /// Waits for the drain of a submitted request to end. It notices the
    /// fence within one poll, so the bound only matters for a stuck backend.
    async fn await_drained(&self) {
        let mut in_flight = self.in_flight.subscribe();
        if timeout(self.ready_timeout, in_flight.wait_for(|busy| !*busy))
            .await
            .is_err()
        {
            tracing::warn!("request still draining, restarting anyway");
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut current = lock(&self.state);
        tracing::debug!(from = ?*current, to = ?state, "session state");
        *current = state;
    }

    fn mark_ready(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(SessionState::Ready);
        tracing::info!(generation, "kernel ready");
    }

    fn fail(&self, error: &KernelError) {
        self.set_state(SessionState::Dead);
        tracing::error!(%error, "kernel unavailable");
        self.emit(Event::KernelError {
            error: describe_kernel_error(error),
        });
    }

    async fn connect(&self) -> Result<(), KernelError> {
        self.kernel.start_channels().await?;
        self.kernel.wait_for_ready(self.ready_timeout).await
    }

    async fn launch(&self) -> Result<(), KernelError> {
        self.kernel.start_kernel().await?;
        self.connect().await
    }

    /// Starts the kernel and waits until it is ready. A failure is reported
    /// as `kernel_error` and returned: the bridge cannot run without a kernel.
    pub async fn start(&self) -> Result<(), KernelError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.set_state(SessionState::Starting);

        match self.launch().await {
            Ok(()) => {
                self.mark_ready();
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Restarts the kernel in place, or starts one if none was ever started.
    /// Reports `restarted` or `kernel_error`; the session stays usable
    /// either way.
    pub async fn restart(&self) -> Result<(), KernelError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.set_state(SessionState::Restarting);
        self.await_drained().await;

        if let Err(e) = self.kernel.stop_channels().await {
            tracing::debug!(error = %e, "ignoring channel teardown failure before restart");
        }

        let restarted = if self.kernel.has_kernel().await {
            match self.kernel.restart_kernel().await {
                Ok(()) => self.connect().await,
                Err(e) => Err(e),
            }
        } else {
            tracing::info!("no kernel to restart, starting a fresh one");
            self.launch().await
        };

        match restarted {
            Ok(()) => {
                self.mark_ready();
                self.emit(Event::Restarted);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Signals the kernel and reports `interrupted` right away, without
    /// waiting for the running request to stop.
    pub async fn interrupt(&self) {
        if let Err(e) = self.kernel.interrupt_kernel().await {
            tracing::warn!(error = %e, "failed to interrupt kernel");
        }

        self.emit(Event::Interrupted {
            cell_id: self.current_cell_id(),
        });
    }

    /// Submits code once no lifecycle operation is running. Returns the
    /// message id with the generation of the kernel that received it.
    pub async fn submit(&self, code: &str) -> Result<(MsgId, u64), KernelError> {
        let _lifecycle = self.lifecycle.lock().await;

        let msg_id = self.kernel.execute(code).await?;
        self.in_flight.send_replace(true);

        Ok((msg_id, self.generation()))
    }

    pub async fn poll_shell_reply(
        &self,
        timeout: Duration,
    ) -> Result<Option<KernelMessage>, KernelError> {
        self.kernel.get_shell_msg(timeout).await
    }

    pub async fn poll_broadcast(
        &self,
        timeout: Duration,
    ) -> Result<Option<KernelMessage>, KernelError> {
        self.kernel.get_iopub_msg(timeout).await
    }

    pub async fn is_alive(&self) -> bool {
        self.kernel.is_alive().await
    }

    /// Stops channels, then the kernel. Each step runs even if the one
    /// before it failed.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        if let Err(e) = self.kernel.stop_channels().await {
            tracing::warn!(error = %e, "failed to stop kernel channels");
        }
        if self.kernel.is_alive().await {
            if let Err(e) = self.kernel.shutdown_kernel().await {
                tracing::warn!(error = %e, "failed to shut down kernel");
            }
        }

        self.set_state(SessionState::Dead);
    }
}
