//! sluice: runs a Jupyter kernel on behalf of an editor.
//!
//! Commands arrive as JSON lines on stdin, events leave as JSON lines on
//! stdout. Logs go to stderr, filtered by `SLUICE_LOG`.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sluice_bridge::{Bridge, BridgeConfig, Emitter};
use sluice_kernel::{JupyterKernel, KernelSpec};
use tokio::io::BufReader;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sluice", version, about = "Editor bridge to a Jupyter kernel")]
struct Args {
    /// Interpreter used to launch ipykernel.
    #[arg(long, env = "SLUICE_PYTHON", default_value = "python3")]
    python: String,

    /// Full kernel command line, overriding --python. Must contain
    /// `{connection_file}`.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    kernel_cmd: Option<Vec<String>>,

    /// Seconds to wait for a kernel to become ready.
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    ready_timeout: u64,

    /// Seconds to wait for the reply carrying the execution count.
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    reply_timeout: u64,

    /// Milliseconds per kernel receive attempt.
    #[arg(long, value_name = "MS", default_value_t = 100)]
    poll_interval: u64,

    /// Milliseconds to wait for the worker at shutdown.
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    join_timeout: u64,
}

impl Args {
    fn config(&self) -> BridgeConfig {
        BridgeConfig {
            ready_timeout: Duration::from_secs(self.ready_timeout),
            reply_timeout: Duration::from_secs(self.reply_timeout),
            poll_interval: Duration::from_millis(self.poll_interval),
            join_timeout: Duration::from_millis(self.join_timeout),
        }
    }

    fn kernel_spec(&self) -> KernelSpec {
        match &self.kernel_cmd {
            Some(argv) => KernelSpec::custom(argv.clone()),
            None => KernelSpec::python(&self.python),
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_env("SLUICE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let spec = args.kernel_spec();
    tracing::info!(argv = ?spec.argv, "starting bridge");

    let kernel = JupyterKernel::new(spec);
    let bridge = Bridge::new(kernel, Emitter::stdout(), args.config());

    bridge
        .run(BufReader::new(tokio::io::stdin()))
        .await
        .context("bridge stopped")?;

    tracing::info!("bridge finished");
    Ok(())
}
