use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::{
    sync::{Mutex, OnceCell},
    time::{timeout, Instant},
};
use uuid::Uuid;
use zeromq::{DealerSocket, SubSocket};

use crate::{
    channel::{connect_dealer, connect_sub, Channel},
    connection::{ConnectionFile, ConnectionInfo},
    message::{KernelMessage, MsgId, Signer},
    process::{probe_module, KernelProcess},
    Kernel, KernelError, KernelSpec,
};

const READY_PROBE: Duration = Duration::from_secs(1);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A Jupyter kernel running as a child process, reached over ZeroMQ.
///
/// The connection file is created on first start and reused by every
/// restart, so a restarted kernel listens on the same ports.
pub struct JupyterKernel {
    spec: KernelSpec,
    session: String,
    ip: String,
    connect_timeout: Duration,
    connection: OnceCell<ConnectionFile>,
    process: Mutex<Option<KernelProcess>>,
    shell: Channel<DealerSocket>,
    control: Channel<DealerSocket>,
    iopub: Channel<SubSocket>,
}

impl JupyterKernel {
    pub fn new(spec: KernelSpec) -> Self {
        Self {
            spec,
            session: Uuid::new_v4().to_string(),
            ip: "127.0.0.1".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connection: OnceCell::new(),
            process: Mutex::new(None),
            shell: Channel::new("shell"),
            control: Channel::new("control"),
            iopub: Channel::new("iopub"),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Where the kernel listens. Absent until the first start.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection.get().map(ConnectionFile::info)
    }

    fn connection(&self) -> Result<&ConnectionFile, KernelError> {
        self.connection.get().ok_or(KernelError::NotStarted)
    }

    fn signer(&self) -> Result<Signer, KernelError> {
        Ok(self.connection()?.info().signer())
    }

    fn request(&self, msg_type: &str, content: Value) -> KernelMessage {
        KernelMessage::new(&self.session, msg_type, content)
    }

    async fn spawn_process(&self) -> Result<KernelProcess, KernelError> {
        let connection = self
            .connection
            .get_or_try_init(|| async { ConnectionFile::create(ConnectionInfo::allocate(&self.ip)?) })
            .await?;

        KernelProcess::spawn(&self.spec.render(connection.path()))
    }

    async fn connect<S, F>(&self, connecting: F) -> Result<S, KernelError>
    where
        F: Future<Output = Result<S, KernelError>>,
    {
        timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| KernelError::ReadyTimeout(self.connect_timeout))?
    }

    #[cfg(unix)]
    async fn interrupt_process(&self, process: &KernelProcess) -> Result<(), KernelError> {
        process.interrupt()
    }

    #[cfg(not(unix))]
    async fn interrupt_process(&self, process: &KernelProcess) -> Result<(), KernelError> {
        tracing::debug!(pid = ?process.id(), "interrupting over the control channel");
        let request = self.request("interrupt_request", json!({}));
        self.control.send(&request, &self.signer()?).await
    }

    /// Waits for the shell reply to `request_id`, skipping unrelated and
    /// undecodable messages.
    async fn await_shell_reply(
        &self,
        request_id: &str,
        reply_type: &str,
        wait: Duration,
        signer: &Signer,
    ) -> Result<bool, KernelError> {
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            match self.shell.recv(remaining, signer).await {
                Ok(Some(reply)) if reply.is_child_of(request_id) && reply.msg_type() == reply_type => {
                    return Ok(true)
                }
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(false),
                Err(KernelError::Protocol(e)) => {
                    tracing::warn!(error = %e, "dropping malformed shell message");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Kernel for JupyterKernel {
    async fn start_kernel(&self) -> Result<(), KernelError> {
        if let (Some(interpreter), Some(module)) = (self.spec.program(), &self.spec.required_module) {
            probe_module(interpreter, module).await?;
        }

        let process = self.spawn_process().await?;
        tracing::info!(pid = ?process.id(), "kernel started");

        let previous = self.process.lock().await.replace(process);
        if let Some(mut previous) = previous {
            if let Err(e) = previous.kill().await {
                tracing::warn!(error = %e, "failed to stop replaced kernel process");
            }
        }

        Ok(())
    }

    async fn restart_kernel(&self) -> Result<(), KernelError> {
        let mut process = self.process.lock().await;
        let old = process.as_mut().ok_or(KernelError::NotStarted)?;

        if let Err(e) = old.kill().await {
            tracing::warn!(error = %e, "failed to stop kernel process before restart");
        }

        let new = self.spawn_process().await?;
        tracing::info!(pid = ?new.id(), "kernel restarted");
        *process = Some(new);

        Ok(())
    }

    async fn has_kernel(&self) -> bool {
        self.process.lock().await.is_some()
    }

    async fn start_channels(&self) -> Result<(), KernelError> {
        let info = self.connection()?.info();

        let shell = self.connect(connect_dealer(&info.endpoint(info.shell_port))).await?;
        let control = self.connect(connect_dealer(&info.endpoint(info.control_port))).await?;
        let iopub = self.connect(connect_sub(&info.endpoint(info.iopub_port))).await?;

        self.shell.open(shell).await;
        self.control.open(control).await;
        self.iopub.open(iopub).await;

        Ok(())
    }

    async fn stop_channels(&self) -> Result<(), KernelError> {
        self.shell.close().await;
        self.control.close().await;
        self.iopub.close().await;

        Ok(())
    }

    async fn wait_for_ready(&self, wait: Duration) -> Result<(), KernelError> {
        let signer = self.signer()?;
        let deadline = Instant::now() + wait;

        loop {
            if !self.is_alive().await {
                return Err(KernelError::Died);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(KernelError::ReadyTimeout(wait));
            }
            let probe = remaining.min(READY_PROBE);

            let request = self.request("kernel_info_request", json!({}));
            self.shell.send(&request, &signer).await?;

            if !self
                .await_shell_reply(request.msg_id(), "kernel_info_reply", probe, &signer)
                .await?
            {
                continue;
            }

            // A reply proves the shell is connected. A broadcast proves the
            // subscription is live too, otherwise early output could be lost.
            match self.iopub.recv(probe, &signer).await {
                Ok(Some(_)) => {
                    tracing::debug!("kernel is ready");
                    return Ok(());
                }
                Ok(None) | Err(KernelError::Protocol(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn interrupt_kernel(&self) -> Result<(), KernelError> {
        match self.process.lock().await.as_ref() {
            Some(process) => self.interrupt_process(process).await,
            None => Ok(()),
        }
    }

    async fn shutdown_kernel(&self) -> Result<(), KernelError> {
        match self.process.lock().await.as_mut() {
            Some(process) => process.kill().await,
            None => Ok(()),
        }
    }

    async fn is_alive(&self) -> bool {
        match self.process.lock().await.as_mut() {
            Some(process) => process.is_alive(),
            None => false,
        }
    }

    async fn execute(&self, code: &str) -> Result<MsgId, KernelError> {
        let request = self.request(
            "execute_request",
            json!({
                "code": code,
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": false,
                "stop_on_error": false,
            }),
        );

        self.shell.send(&request, &self.signer()?).await?;

        Ok(request.header.msg_id)
    }

    async fn get_shell_msg(&self, wait: Duration) -> Result<Option<KernelMessage>, KernelError> {
        self.shell.recv(wait, &self.signer()?).await
    }

    async fn get_iopub_msg(&self, wait: Duration) -> Result<Option<KernelMessage>, KernelError> {
        self.iopub.recv(wait, &self.signer()?).await
    }
}
