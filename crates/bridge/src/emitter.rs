use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use crate::protocol::Event;

/// Writes events as JSON lines. Clones share one writer and one lock, so
/// concurrent emitters never interleave partial lines.
#[derive(Clone)]
pub struct Emitter {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Emitter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Emits one event. A closed output stream is logged, never raised:
    /// nobody is left to report it to.
    ///
    /// The write is synchronous and holds a runtime thread while a slow
    /// reader applies backpressure. Lines are short and the binary runs the
    /// multi-thread runtime, so other tasks keep making progress.
    pub fn emit(&self, event: &Event) {
        if let Err(e) = self.write_line(event) {
            tracing::warn!(error = %e, "failed to write event");
        }
    }

    fn write_line(&self, event: &Event) -> io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output lock poisoned"))?;
        writer.write_all(&line)?;
        writer.flush()
    }
}
