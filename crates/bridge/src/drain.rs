//! Runs one request to completion and streams its results.
//!
//! A drain submits the code, waits for the shell reply that carries the
//! execution count, then consumes broadcast messages until the kernel
//! reports idle for this request. Messages belonging to other requests are
//! skipped. Every drain emits `execute_start` followed by exactly one
//! terminal event: `execute_done` or `kernel_dead`.

use serde_json::Value;
use sluice_kernel::{Kernel, KernelError, KernelMessage, MsgId};
use tokio::time::{sleep, Instant};

use crate::{
    config::BridgeConfig,
    protocol::{Event, OutputItem},
    queue::Request,
    session::{Session, SessionState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Done,
    KernelDead,
    SubmissionFailed,
}

/// The kernel died, or a restart began, while the request was in flight.
struct KernelLost;

pub async fn drain<K: Kernel>(
    session: &Session<K>,
    request: &Request,
    config: &BridgeConfig,
) -> DrainOutcome {
    let cell_id = request.cell_id.as_str();

    session.set_current_cell_id(Some(cell_id.to_string()));
    session.emit(Event::ExecuteStart {
        cell_id: cell_id.to_string(),
    });
    let started = Instant::now();

    let (msg_id, generation) = match session.submit(&request.code).await {
        Ok(submitted) => submitted,
        Err(e) => {
            tracing::warn!(%cell_id, error = %e, "failed to submit request");
            session.emit(Event::ExecuteDone {
                cell_id: cell_id.to_string(),
                exec_count: None,
                ms: 0,
                outputs: Some(vec![OutputItem::synthetic_error("SubmissionError", &e.to_string())]),
            });
            return DrainOutcome::SubmissionFailed;
        }
    };
    tracing::debug!(%cell_id, %msg_id, generation, "request submitted");

    let inflight = InFlight {
        session,
        config,
        cell_id,
        msg_id,
        generation,
    };

    let result = match inflight.await_execute_reply().await {
        Ok(exec_count) => inflight.await_idle(exec_count, started).await,
        Err(lost) => Err(lost),
    };

    match result {
        Ok(()) => DrainOutcome::Done,
        Err(KernelLost) => {
            tracing::warn!(%cell_id, "kernel died while request was in flight");
            session.emit(Event::KernelDead);
            DrainOutcome::KernelDead
        }
    }
}

struct InFlight<'a, K> {
    session: &'a Session<K>,
    config: &'a BridgeConfig,
    cell_id: &'a str,
    msg_id: MsgId,
    generation: u64,
}

impl<K: Kernel> InFlight<'_, K> {
    async fn check_alive(&self) -> Result<(), KernelLost> {
        if self.session.generation() != self.generation
            || self.session.state() != SessionState::Ready
            || !self.session.is_alive().await
        {
            return Err(KernelLost);
        }
        Ok(())
    }

    fn is_ours(&self, message: &KernelMessage) -> bool {
        message.is_child_of(&self.msg_id)
    }

    async fn pause_after(&self, error: KernelError) {
        tracing::debug!(cell_id = self.cell_id, %error, "receive failed, retrying");
        sleep(self.config.poll_interval).await;
    }

    /// Waits a bounded time for the execution count. Giving up leaves it absent.
    async fn await_execute_reply(&self) -> Result<Option<i64>, KernelLost> {
        let deadline = Instant::now() + self.config.reply_timeout;

        while Instant::now() < deadline {
            self.check_alive().await?;

            match self.session.poll_shell_reply(self.config.poll_interval).await {
                Ok(Some(reply)) if self.is_ours(&reply) && reply.msg_type() == "execute_reply" => {
                    return Ok(reply.content.get("execution_count").and_then(Value::as_i64));
                }
                Ok(_) => {}
                Err(e) => self.pause_after(e).await,
            }
        }

        tracing::warn!(cell_id = self.cell_id, "no execute_reply in time, execution count unknown");
        Ok(None)
    }

    async fn await_idle(&self, exec_count: Option<i64>, started: Instant) -> Result<(), KernelLost> {
        loop {
            self.check_alive().await?;

            let message = match self.session.poll_broadcast(self.config.poll_interval).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    self.pause_after(e).await;
                    continue;
                }
            };

            if !self.is_ours(&message) {
                continue;
            }

            if let Some(item) = OutputItem::from_message(message.msg_type(), &message.content) {
                self.session.emit(Event::Output {
                    cell_id: self.cell_id.to_string(),
                    item,
                });
            } else if is_idle(&message) {
                self.session.emit(Event::ExecuteDone {
                    cell_id: self.cell_id.to_string(),
                    exec_count,
                    ms: started.elapsed().as_millis() as u64,
                    outputs: None,
                });
                return Ok(());
            }
        }
    }
}

fn is_idle(message: &KernelMessage) -> bool {
    message.msg_type() == "status"
        && message.content.get("execution_state").and_then(Value::as_str) == Some("idle")
}
