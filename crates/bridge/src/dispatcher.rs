use sluice_kernel::Kernel;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    protocol::Command,
    queue::{ExecQueue, Request},
    session::Session,
};

/// Reads commands until the input ends. `execute` goes to the queue;
/// `interrupt` and `restart` act on the session right away.
pub async fn dispatch<R, K>(mut input: R, session: &Session<K>, queue: &ExecQueue) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    K: Kernel,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).await? == 0 {
            tracing::debug!("control input closed");
            return Ok(());
        }

        let Some(command) = Command::parse(&String::from_utf8_lossy(&line)) else {
            continue;
        };

        match command {
            Command::Execute { cell_id, code } => {
                tracing::debug!(%cell_id, "execute queued");
                queue.enqueue(Request { cell_id, code });
            }
            Command::Interrupt => session.interrupt().await,
            Command::Restart => {
                // Already reported as `restarted` or `kernel_error`.
                let _ = session.restart().await;
            }
            Command::Unknown => tracing::debug!("ignoring unknown command"),
        }
    }
}
