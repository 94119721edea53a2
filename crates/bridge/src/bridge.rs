use std::sync::Arc;

use sluice_kernel::Kernel;
use tokio::io::AsyncBufRead;

use crate::{
    config::BridgeConfig, dispatcher::dispatch, emitter::Emitter, error::BridgeError, queue,
    session::Session,
};

pub struct Bridge<K> {
    session: Arc<Session<K>>,
    config: BridgeConfig,
}

impl<K: Kernel + 'static> Bridge<K> {
    pub fn new(kernel: K, emitter: Emitter, config: BridgeConfig) -> Self {
        let session = Arc::new(Session::new(kernel, emitter, config.ready_timeout));
        Self { session, config }
    }

    pub fn session(&self) -> &Arc<Session<K>> {
        &self.session
    }

    /// Starts the kernel, serves commands from `input` until it ends, then
    /// tears everything down.
    pub async fn run<R>(self, input: R) -> Result<(), BridgeError>
    where
        R: AsyncBufRead + Unpin,
    {
        if let Err(e) = self.session.start().await {
            self.session.shutdown().await;
            return Err(BridgeError::Startup(e));
        }

        let queue = queue::launch(self.session.clone(), self.config.clone());
        let dispatched = dispatch(input, &self.session, &queue).await;

        queue.close(self.config.join_timeout).await;
        self.session.shutdown().await;

        Ok(dispatched?)
    }
}
