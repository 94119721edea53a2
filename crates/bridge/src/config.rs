use std::time::Duration;

/// Timing knobs of the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// How long a (re)started kernel may take to answer on its channels.
    pub ready_timeout: Duration,
    /// How long a drain waits for the shell reply carrying the execution count.
    pub reply_timeout: Duration,
    /// Timeout of a single channel poll.
    pub poll_interval: Duration,
    /// How long shutdown waits for the worker to finish.
    pub join_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(2),
        }
    }
}
