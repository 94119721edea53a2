use std::{sync::Arc, time::Duration};

use sluice_kernel::Kernel;
use tokio::{
    sync::mpsc,
    task::{self, JoinHandle},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use crate::{config::BridgeConfig, drain::drain, session::Session};

/// One unit of work: code to run on behalf of an editor cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub cell_id: String,
    pub code: String,
}

impl Request {
    pub fn new(cell_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            cell_id: cell_id.into(),
            code: code.into(),
        }
    }
}

enum Task {
    Run(Request),
    Stop,
}

/// FIFO of requests consumed by a single worker, so at most one request is
/// ever in flight against the kernel.
pub struct ExecQueue {
    task_sender: mpsc::UnboundedSender<Task>,
    stop: CancellationToken,
    worker: JoinHandle<()>,
}

impl ExecQueue {
    /// Queues a request. Never blocks.
    pub fn enqueue(&self, request: Request) {
        if let Err(mpsc::error::SendError(Task::Run(request))) =
            self.task_sender.send(Task::Run(request))
        {
            tracing::warn!(cell_id = %request.cell_id, "worker has stopped, request dropped");
        }
    }

    /// Stops the worker and waits up to `join_timeout` for it. A worker still
    /// draining after that is aborted. Requests still queued are dropped.
    pub async fn close(self, join_timeout: Duration) {
        self.stop.cancel();
        let _ = self.task_sender.send(Task::Stop);

        let abort = self.worker.abort_handle();
        match timeout(join_timeout, self.worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "worker ended abnormally"),
            Err(_) => {
                tracing::warn!(?join_timeout, "worker did not stop in time, aborting it");
                abort.abort();
            }
        }
    }
}

pub fn launch<K>(session: Arc<Session<K>>, config: BridgeConfig) -> ExecQueue
where
    K: Kernel + 'static,
{
    let (task_sender, task_receiver) = mpsc::unbounded_channel();
    let stop = CancellationToken::new();

    let worker = task::spawn(run_worker(session, task_receiver, stop.clone(), config));

    ExecQueue {
        task_sender,
        stop,
        worker,
    }
}

async fn run_worker<K: Kernel>(
    session: Arc<Session<K>>,
    mut task_receiver: mpsc::UnboundedReceiver<Task>,
    stop: CancellationToken,
    config: BridgeConfig,
) {
    loop {
        let task = tokio::select! {
            biased;

            _ = stop.cancelled() => break,
            task = task_receiver.recv() => task,
        };

        let request = match task {
            Some(Task::Run(request)) => request,
            Some(Task::Stop) | None => break,
        };

        let outcome = drain(&session, &request, &config).await;
        session.finish_request();

        tracing::debug!(cell_id = %request.cell_id, ?outcome, "request drained");
    }

    tracing::debug!("worker stopped");
}
