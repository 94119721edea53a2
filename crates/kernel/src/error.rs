use std::{io, time::Duration};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("kernel has not been started")]
    NotStarted,

    #[error("kernel channels are closed")]
    ChannelsClosed,

    /// The interpreter runs but lacks a module the kernel needs.
    #[error("{module} is not installed in {interpreter}")]
    MissingComponent { module: String, interpreter: String },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("kernel process exited before it became ready")]
    Died,

    #[error("kernel did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("socket error: {0}")]
    Socket(#[from] zeromq::ZmqError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}
