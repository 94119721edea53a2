use sluice_kernel::KernelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("kernel failed to start: {0}")]
    Startup(#[source] KernelError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The user-facing text of a kernel failure. A missing module gets the
/// command that installs it.
pub fn describe_kernel_error(error: &KernelError) -> String {
    match error {
        KernelError::MissingComponent {
            module,
            interpreter,
        } => format!(
            "{module} is not installed in {interpreter}. \
             Install with: '{interpreter} -m pip install -U {module}'"
        ),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[googletest::test]
    fn missing_module_names_the_install_command() {
        let error = KernelError::MissingComponent {
            module: "ipykernel".to_string(),
            interpreter: "/opt/venv/bin/python".to_string(),
        };

        expect_that!(
            describe_kernel_error(&error),
            eq("ipykernel is not installed in /opt/venv/bin/python. \
                Install with: '/opt/venv/bin/python -m pip install -U ipykernel'")
        );
    }

    #[googletest::test]
    fn other_failures_use_their_message() {
        let error = KernelError::ReadyTimeout(std::time::Duration::from_secs(30));

        expect_that!(
            describe_kernel_error(&error),
            eq("kernel did not become ready within 30s")
        );
    }
}
