use std::path::Path;

pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// How to launch a kernel process.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSpec {
    pub argv: Vec<String>,
    /// Module the interpreter must be able to import before spawning.
    pub required_module: Option<String>,
}

impl KernelSpec {
    /// An ipykernel launched by the given interpreter.
    pub fn python(interpreter: impl Into<String>) -> Self {
        let argv = vec![
            interpreter.into(),
            "-m".to_string(),
            "ipykernel_launcher".to_string(),
            "-f".to_string(),
            CONNECTION_FILE_PLACEHOLDER.to_string(),
        ];

        Self {
            argv,
            required_module: Some("ipykernel".to_string()),
        }
    }

    pub fn custom(argv: Vec<String>) -> Self {
        Self {
            argv,
            required_module: None,
        }
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn render(&self, connection_file: &Path) -> Vec<String> {
        let connection_file = connection_file.to_string_lossy();
        self.argv
            .iter()
            .map(|arg| arg.replace(CONNECTION_FILE_PLACEHOLDER, &connection_file))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[googletest::test]
    fn python_spec_launches_ipykernel() {
        let spec = KernelSpec::python("/usr/bin/python3");

        expect_that!(spec.program(), some(eq("/usr/bin/python3")));
        expect_that!(spec.required_module, some(eq("ipykernel")));
    }

    #[googletest::test]
    fn render_substitutes_the_connection_file() {
        let spec = KernelSpec::python("python3");

        let argv = spec.render(Path::new("/tmp/kernel-1.json"));

        expect_that!(
            argv,
            elements_are![
                eq("python3"),
                eq("-m"),
                eq("ipykernel_launcher"),
                eq("-f"),
                eq("/tmp/kernel-1.json")
            ]
        );
    }

    #[googletest::test]
    fn custom_spec_requires_nothing() {
        let spec = KernelSpec::custom(vec!["my-kernel".into(), "--conn={connection_file}".into()]);

        expect_that!(spec.required_module, none());
        expect_that!(
            spec.render(Path::new("/run/k.json")),
            elements_are![eq("my-kernel"), eq("--conn=/run/k.json")]
        );
    }
}
