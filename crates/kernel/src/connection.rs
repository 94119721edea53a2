use std::{io::Write, net::TcpListener, path::Path};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::{message::Signer, KernelError};

/// Contents of a Jupyter connection file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub ip: String,
    pub transport: String,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub key: String,
    pub signature_scheme: String,
    pub kernel_name: String,
}

impl ConnectionInfo {
    /// Reserves five distinct loopback ports and a fresh signing key.
    ///
    /// All listeners are held at once so the operating system cannot hand
    /// out the same port twice; they are released before the kernel binds.
    pub fn allocate(ip: &str) -> Result<Self, KernelError> {
        let listeners = (0..5)
            .map(|_| TcpListener::bind((ip, 0)))
            .collect::<Result<Vec<_>, _>>()?;
        let ports = listeners
            .iter()
            .map(|l| l.local_addr().map(|addr| addr.port()))
            .collect::<Result<Vec<_>, _>>()?;
        drop(listeners);

        Ok(Self {
            ip: ip.to_string(),
            transport: "tcp".to_string(),
            shell_port: ports[0],
            iopub_port: ports[1],
            stdin_port: ports[2],
            control_port: ports[3],
            hb_port: ports[4],
            key: Uuid::new_v4().to_string(),
            signature_scheme: "hmac-sha256".to_string(),
            kernel_name: String::new(),
        })
    }

    pub fn endpoint(&self, port: u16) -> String {
        format!("{}://{}:{}", self.transport, self.ip, port)
    }

    pub fn signer(&self) -> Signer {
        Signer::new(self.key.as_bytes())
    }
}

/// A connection file on disk, removed when dropped.
pub struct ConnectionFile {
    info: ConnectionInfo,
    file: NamedTempFile,
}

impl ConnectionFile {
    pub fn create(info: ConnectionInfo) -> Result<Self, KernelError> {
        let mut file = tempfile::Builder::new()
            .prefix("sluice-kernel-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(&mut file, &info)?;
        file.flush()?;

        Ok(Self { info, file })
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use std::collections::HashSet;

    #[googletest::test]
    fn allocated_ports_are_distinct() {
        let info = ConnectionInfo::allocate("127.0.0.1").unwrap();

        let ports: HashSet<u16> = [
            info.shell_port,
            info.iopub_port,
            info.stdin_port,
            info.control_port,
            info.hb_port,
        ]
        .into_iter()
        .collect();

        expect_that!(ports.len(), eq(5));
        expect_that!(info.key, not(eq("")));
    }

    #[googletest::test]
    fn endpoint_uses_transport_and_ip() {
        let info = ConnectionInfo::allocate("127.0.0.1").unwrap();

        expect_that!(
            info.endpoint(info.shell_port),
            eq(format!("tcp://127.0.0.1:{}", info.shell_port))
        );
    }

    #[googletest::test]
    fn connection_file_holds_the_info_until_dropped() {
        let info = ConnectionInfo::allocate("127.0.0.1").unwrap();
        let file = ConnectionFile::create(info.clone()).unwrap();
        let path = file.path().to_path_buf();

        let written: ConnectionInfo =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        expect_that!(written, eq(info));

        drop(file);
        expect_that!(path.exists(), eq(false));
    }
}
