#![allow(dead_code)]

use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::Value;
use sluice_bridge::{BridgeConfig, Emitter, Session};
use sluice_kernel::Kernel;
use tokio::time::{sleep, Instant};

/// An in-memory output stream.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    pub fn emitter(&self) -> Emitter {
        Emitter::new(self.clone())
    }

    pub fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Polls the captured events until `done` holds for them.
    pub async fn wait_for(&self, done: impl Fn(&[Value]) -> bool) -> Vec<Value> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let events = self.events();
            if done(&events) {
                return events;
            }
            if Instant::now() > deadline {
                panic!("timed out waiting for events, got: {events:#?}");
            }
            sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        ready_timeout: Duration::from_secs(1),
        reply_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(5),
        join_timeout: Duration::from_millis(500),
    }
}

pub fn session<K: Kernel>(kernel: K, capture: &Capture) -> Arc<Session<K>> {
    Arc::new(Session::new(kernel, capture.emitter(), test_config().ready_timeout))
}

pub fn is_event(event: &Value, kind: &str, cell_id: &str) -> bool {
    event["type"] == kind && event["cell_id"] == cell_id
}

pub fn has_event(events: &[Value], kind: &str, cell_id: &str) -> bool {
    events.iter().any(|e| is_event(e, kind, cell_id))
}

pub fn has_type(events: &[Value], kind: &str) -> bool {
    events.iter().any(|e| e["type"] == kind)
}

pub fn of_type<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events.iter().filter(|e| e["type"] == kind).collect()
}
