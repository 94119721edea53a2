use std::time::Duration;

use bytes::Bytes;
use tokio::{sync::Mutex, time::timeout};
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::{
    message::{KernelMessage, Signer},
    KernelError,
};

/// One kernel channel. The socket is absent while channels are stopped.
pub struct Channel<S> {
    name: &'static str,
    socket: Mutex<Option<S>>,
}

impl<S> Channel<S> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            socket: Mutex::new(None),
        }
    }

    pub async fn open(&self, socket: S) {
        *self.socket.lock().await = Some(socket);
    }

    /// Drops the socket, if one is open.
    pub async fn close(&self) {
        if self.socket.lock().await.take().is_some() {
            tracing::debug!(channel = self.name, "channel closed");
        }
    }
}

impl<S: SocketSend + Send> Channel<S> {
    pub async fn send(&self, message: &KernelMessage, signer: &Signer) -> Result<(), KernelError> {
        let frames = message.to_frames(signer)?;
        let frames = ZmqMessage::try_from(frames).map_err(|e| KernelError::Protocol(e.to_string()))?;

        let mut socket = self.socket.lock().await;
        let socket = socket.as_mut().ok_or(KernelError::ChannelsClosed)?;
        socket.send(frames).await?;

        tracing::trace!(channel = self.name, msg_type = message.msg_type(), msg_id = message.msg_id(), "sent");
        Ok(())
    }
}

impl<S: SocketRecv + Send> Channel<S> {
    /// Waits up to `wait` for the next message. `Ok(None)` means the wait
    /// elapsed without one.
    pub async fn recv(
        &self,
        wait: Duration,
        signer: &Signer,
    ) -> Result<Option<KernelMessage>, KernelError> {
        let mut socket = self.socket.lock().await;
        let socket = socket.as_mut().ok_or(KernelError::ChannelsClosed)?;

        let frames = match timeout(wait, socket.recv()).await {
            Err(_) => return Ok(None),
            Ok(received) => received?,
        };
        let frames: Vec<Bytes> = frames.into_vecdeque().into();

        let message = KernelMessage::from_frames(frames, signer)?;
        tracing::trace!(channel = self.name, msg_type = message.msg_type(), parent = ?message.parent_msg_id(), "received");

        Ok(Some(message))
    }
}

pub async fn connect_dealer(endpoint: &str) -> Result<DealerSocket, KernelError> {
    let mut socket = DealerSocket::new();
    socket.connect(endpoint).await?;
    Ok(socket)
}

pub async fn connect_sub(endpoint: &str) -> Result<SubSocket, KernelError> {
    let mut socket = SubSocket::new();
    socket.connect(endpoint).await?;
    socket.subscribe("").await?;
    Ok(socket)
}
