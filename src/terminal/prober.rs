// ABOUTME: Discovers an interactive shell inside the target container
// Runs a short non-interactive directory listing and picks the first known shell

use super::error::TerminalError;
use crate::exec::{ExecOutput, ExecTarget, RemoteExec, StreamOptions};
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Shell names in priority order
pub const VALID_SHELLS: [&str; 4] = ["bash", "sh", "powershell", "cmd"];

/// Pick the first known shell mentioned in a directory listing
pub fn select_shell(listing: &str) -> Option<&'static str> {
    VALID_SHELLS
        .iter()
        .copied()
        .find(|shell| listing.contains(shell))
}

#[derive(Default)]
struct CaptureBuffer(Mutex<Vec<u8>>);

impl CaptureBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[async_trait]
impl ExecOutput for CaptureBuffer {
    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }
}

pub struct ShellProber {
    exec: Arc<dyn RemoteExec>,
    shell_dir: String,
}

impl ShellProber {
    pub fn new(exec: Arc<dyn RemoteExec>, shell_dir: impl Into<String>) -> Self {
        Self {
            exec,
            shell_dir: shell_dir.into(),
        }
    }

    /// Returns the command vector for the shell to run interactively
    pub async fn probe(&self, target: &ExecTarget) -> Result<Vec<String>, TerminalError> {
        let command = vec!["ls".to_string(), self.shell_dir.clone()];
        let stdout = CaptureBuffer::default();
        let stderr = CaptureBuffer::default();

        self.exec
            .stream(
                target,
                &command,
                StreamOptions {
                    stdin: None,
                    stdout: &stdout,
                    stderr: &stderr,
                    size_queue: None,
                    tty: false,
                },
            )
            .await
            .map_err(|e| {
                error!("Shell probe in {} failed: {}", target, e);
                e
            })?;

        let errors = stderr.contents();
        if !errors.is_empty() {
            debug!("Shell probe stderr: {}", errors.trim_end());
        }

        match select_shell(&stdout.contents()) {
            Some(shell) => {
                info!("Using shell {} in {}", shell, target);
                Ok(vec![shell.to_string()])
            }
            None => Err(TerminalError::ShellNotFound(target.to_string())),
        }
    }
}
