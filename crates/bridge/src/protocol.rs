//! The line protocol: one JSON object per line in both directions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A control instruction read from the input stream.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Execute {
        cell_id: String,
        #[serde(default)]
        code: String,
    },
    Interrupt,
    Restart,
    #[serde(other)]
    Unknown,
}

impl Command {
    /// Parses one input line. Blank and malformed lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str(line) {
            Ok(command) => Some(command),
            Err(e) => {
                tracing::debug!(error = %e, "discarding malformed command");
                None
            }
        }
    }
}

/// An event written to the output stream.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    KernelError {
        error: String,
    },
    Restarted,
    ExecuteStart {
        cell_id: String,
    },
    Output {
        cell_id: String,
        item: OutputItem,
    },
    ExecuteDone {
        cell_id: String,
        exec_count: Option<i64>,
        ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        outputs: Option<Vec<OutputItem>>,
    },
    Interrupted {
        cell_id: Option<String>,
    },
    KernelDead,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Stream,
    DisplayData,
    ExecutionResult,
    Error,
    ClearOutput,
    UpdateDisplayData,
}

impl OutputKind {
    /// Maps a broadcast message type to an output kind. Other message types
    /// (status, execute_input, comm traffic) carry no output.
    pub fn from_msg_type(msg_type: &str) -> Option<Self> {
        match msg_type {
            "stream" => Some(Self::Stream),
            "display_data" => Some(Self::DisplayData),
            "execute_result" => Some(Self::ExecutionResult),
            "error" => Some(Self::Error),
            "clear_output" => Some(Self::ClearOutput),
            "update_display_data" => Some(Self::UpdateDisplayData),
            _ => None,
        }
    }
}

/// One output of a request: its kind plus the message content, passed
/// through as-is apart from stream text normalization.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutputItem {
    pub kind: OutputKind,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl OutputItem {
    pub fn from_message(msg_type: &str, content: &Value) -> Option<Self> {
        let kind = OutputKind::from_msg_type(msg_type)?;

        let mut payload = match content {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        payload.remove("kind");

        if kind == OutputKind::Stream {
            // Joined only when every fragment is text; anything else passes through.
            if let Some(Value::Array(fragments)) = payload.get("text") {
                if let Some(text) = fragments.iter().map(Value::as_str).collect::<Option<String>>() {
                    payload.insert("text".to_string(), Value::String(text));
                }
            }
        }

        Some(Self { kind, payload })
    }

    /// An error output standing in for a request that never reached the kernel.
    pub fn synthetic_error(ename: &str, evalue: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("ename".to_string(), Value::String(ename.to_string()));
        payload.insert("evalue".to_string(), Value::String(evalue.to_string()));
        payload.insert("traceback".to_string(), Value::Array(Vec::new()));

        Self {
            kind: OutputKind::Error,
            payload,
        }
    }
}
