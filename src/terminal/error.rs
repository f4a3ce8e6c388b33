// ABOUTME: Error types for terminal sessions
// Maps each failure to the close status reported to the browser

use crate::exec::ExecError;
use std::time::Duration;
use thiserror::Error;

/// Close status for exec setup or stream failures
pub const CLOSE_EXEC_FAILED: u16 = 126;
/// Close status for sessions closed after inactivity
pub const CLOSE_IDLE_TIMEOUT: u16 = 128;
/// Close status for a session whose process exited normally
pub const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Invalid terminal request: {0}")]
    InvalidRequest(String),

    #[error("No available shell found in {0}")]
    ShellNotFound(String),

    #[error("Malformed terminal message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownOperation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed by client")]
    PeerClosed,

    #[error("Remote exec failed: {0}")]
    RemoteStream(#[from] ExecError),

    #[error("Exec stream task failed: {0}")]
    StreamTask(String),

    #[error("Connection closed after {0:?} without input")]
    IdleTimeout(Duration),

    #[error("Connection need to be closed")]
    SessionClosed,
}

impl TerminalError {
    /// Status code used when this error terminates the client socket
    pub fn close_code(&self) -> u16 {
        match self {
            Self::IdleTimeout(_) => CLOSE_IDLE_TIMEOUT,
            _ => CLOSE_EXEC_FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(TerminalError::IdleTimeout(Duration::from_secs(1)).close_code(), 128);
        assert_eq!(TerminalError::ShellNotFound("a/b/c".into()).close_code(), 126);
        assert_eq!(
            TerminalError::RemoteStream(ExecError::TargetNotFound("a/b/c".into())).close_code(),
            126
        );
    }
}
