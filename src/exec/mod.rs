// ABOUTME: Remote process execution inside containers, abstracted behind a trait
// The terminal layer talks to `RemoteExec`; `DockerExec` is the Docker Engine backend

pub mod docker;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

pub use docker::DockerExec;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Docker connection error: {0}")]
    Connection(#[from] bollard::errors::Error),
    #[error("No running container found for {0}")]
    TargetNotFound(String),
    #[error("Exec {0} started detached, expected an attached stream")]
    Detached(String),
    #[error("Terminal input ended: {0}")]
    InputTerminated(#[source] io::Error),
    #[error("Failed to forward exec output: {0}")]
    Output(#[source] io::Error),
}

/// The container a command is executed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// Terminal geometry in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub width: u16,
    pub height: u16,
}

/// Result of pulling input for the remote process
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the buffer. Zero is valid and does not mean end of input.
    Data(usize),
    /// Input is over. `buf[..written]` holds bytes (the end-of-transmission
    /// sentinel) that must still reach the process.
    Terminated { written: usize, error: io::Error },
}

/// Source of stdin bytes for an exec stream
#[async_trait]
pub trait ExecInput: Send + Sync {
    async fn read(&self, buf: &mut [u8]) -> ReadOutcome;
}

/// Sink for stdout/stderr bytes of an exec stream
#[async_trait]
pub trait ExecOutput: Send + Sync {
    async fn write(&self, data: &[u8]) -> io::Result<usize>;
}

/// Supplies terminal sizes to apply to a tty exec. `None` ends the queue.
#[async_trait]
pub trait TerminalSizeQueue: Send + Sync {
    async fn next_size(&self) -> Option<TerminalSize>;
}

/// Wiring for a single exec stream
pub struct StreamOptions<'a> {
    pub stdin: Option<&'a dyn ExecInput>,
    pub stdout: &'a dyn ExecOutput,
    pub stderr: &'a dyn ExecOutput,
    pub size_queue: Option<&'a dyn TerminalSizeQueue>,
    pub tty: bool,
}

/// Runs a command inside a container and streams its I/O until it exits
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn stream(
        &self,
        target: &ExecTarget,
        command: &[String],
        options: StreamOptions<'_>,
    ) -> Result<(), ExecError>;
}

/// A pod and the names of its containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<String>,
}

/// Read-only view of the namespaces and pods reachable for exec
#[async_trait]
pub trait PodDirectory: Send + Sync {
    async fn namespaces(&self) -> Result<Vec<String>, ExecError>;
    async fn pods(&self, namespace: &str) -> Result<Vec<PodInfo>, ExecError>;
}
