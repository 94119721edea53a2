use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::KernelError;

/// Checks that `interpreter` can import `module`.
pub async fn probe_module(interpreter: &str, module: &str) -> Result<(), KernelError> {
    let status = Command::new(interpreter)
        .arg("-c")
        .arg(format!("import {module}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|source| KernelError::Spawn {
            program: interpreter.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(KernelError::MissingComponent {
            module: module.to_string(),
            interpreter: interpreter.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct KernelProcess {
    child: Child,
}

impl KernelProcess {
    pub fn spawn(argv: &[String]) -> Result<Self, KernelError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| KernelError::Protocol("kernel command is empty".to_string()))?;

        // stdout belongs to the line protocol, so the kernel never gets it.
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| KernelError::Spawn {
                program: program.clone(),
                source,
            })?;

        tracing::debug!(pid = ?child.id(), %program, "kernel process spawned");

        Ok(Self { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    #[cfg(unix)]
    pub fn interrupt(&self) -> Result<(), KernelError> {
        use nix::{
            sys::signal::{kill, Signal},
            unistd::Pid,
        };

        let pid = self.child.id().ok_or(KernelError::Died)?;
        kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(std::io::Error::from)?;

        Ok(())
    }

    pub async fn kill(&mut self) -> Result<(), KernelError> {
        if self.is_alive() {
            self.child.kill().await?;
        }

        Ok(())
    }
}
