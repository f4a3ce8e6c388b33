// ABOUTME: Wire envelope exchanged with the browser terminal over the socket
// JSON objects of the form {"Op","Data","Code","Rows","Cols"}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message operation. Unknown values are kept so they can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    /// Client → server: keystrokes for the remote process
    Stdin,
    /// Client → server: terminal geometry change
    Resize,
    /// Server → client: remote process output
    Stdout,
    Unrecognized(String),
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stdin => "stdin",
            Self::Resize => "resize",
            Self::Stdout => "stdout",
            Self::Unrecognized(op) => op,
        }
    }
}

impl From<String> for Operation {
    fn from(op: String) -> Self {
        match op.as_str() {
            "stdin" => Self::Stdin,
            "resize" => Self::Resize,
            "stdout" => Self::Stdout,
            _ => Self::Unrecognized(op),
        }
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Unrecognized(op) => op,
            known => known.as_str().to_string(),
        }
    }
}

impl Default for Operation {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TerminalMessage {
    pub op: Operation,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,
}

impl TerminalMessage {
    /// Create a stdout message carrying process output
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            op: Operation::Stdout,
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn stdin(data: impl Into<String>) -> Self {
        Self {
            op: Operation::Stdin,
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn resize(cols: u16, rows: u16) -> Self {
        Self {
            op: Operation::Resize,
            rows: Some(rows),
            cols: Some(cols),
            ..Default::default()
        }
    }

    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
