// ABOUTME: Scripted remote exec used by the integration tests
// Answers shell probes with a fixed listing and echoes interactive stdin back as output

#![allow(dead_code)]

use async_trait::async_trait;
use pod_terminal::exec::{
    ExecError, ExecTarget, PodDirectory, PodInfo, ReadOutcome, RemoteExec, StreamOptions,
    TerminalSize,
};
use std::sync::Mutex;
use std::time::Duration;

/// How the interactive process ends
#[derive(Debug, Clone)]
pub enum Exit {
    /// Runs until its input terminates
    OnInputEnd,
    /// Exits on its own after the given time
    After(Duration),
    /// Exits once stdin contains the marker
    OnInput(&'static str),
    /// The exec cannot be started
    Fail,
}

pub struct ScriptedExec {
    listing: String,
    exit: Exit,
    pub commands: Mutex<Vec<Vec<String>>>,
    pub sizes: Mutex<Vec<TerminalSize>>,
    pub stdin: Mutex<Vec<u8>>,
}

impl ScriptedExec {
    pub fn new(listing: &str, exit: Exit) -> Self {
        Self {
            listing: listing.to_string(),
            exit,
            commands: Mutex::new(Vec::new()),
            sizes: Mutex::new(Vec::new()),
            stdin: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn sizes(&self) -> Vec<TerminalSize> {
        self.sizes.lock().unwrap().clone()
    }

    pub fn stdin(&self) -> Vec<u8> {
        self.stdin.lock().unwrap().clone()
    }

    async fn interactive(&self, options: StreamOptions<'_>) -> Result<(), ExecError> {
        let stdin = options.stdin.expect("interactive exec needs stdin");

        let sizes = async {
            if let Some(queue) = options.size_queue {
                while let Some(size) = queue.next_size().await {
                    self.sizes.lock().unwrap().push(size);
                }
            }
            std::future::pending::<()>().await
        };

        let echo = async {
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf).await {
                    ReadOutcome::Data(0) => {}
                    ReadOutcome::Data(n) => {
                        self.stdin.lock().unwrap().extend_from_slice(&buf[..n]);
                        options
                            .stdout
                            .write(&buf[..n])
                            .await
                            .map_err(ExecError::Output)?;
                        if let Exit::OnInput(marker) = self.exit {
                            if String::from_utf8_lossy(&self.stdin()).contains(marker) {
                                return Ok(());
                            }
                        }
                    }
                    ReadOutcome::Terminated { written, error } => {
                        self.stdin.lock().unwrap().extend_from_slice(&buf[..written]);
                        return Err(ExecError::InputTerminated(error));
                    }
                }
            }
        };

        let exit = async {
            match self.exit {
                Exit::After(delay) => tokio::time::sleep(delay).await,
                _ => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = sizes => Ok(()),
            result = echo => result,
            () = exit => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteExec for ScriptedExec {
    async fn stream(
        &self,
        target: &ExecTarget,
        command: &[String],
        options: StreamOptions<'_>,
    ) -> Result<(), ExecError> {
        self.commands.lock().unwrap().push(command.to_vec());

        if !options.tty {
            options
                .stdout
                .write(self.listing.as_bytes())
                .await
                .map_err(ExecError::Output)?;
            return Ok(());
        }
        if let Exit::Fail = self.exit {
            return Err(ExecError::TargetNotFound(target.to_string()));
        }
        self.interactive(options).await
    }
}

/// Fixed namespace/pod listing
pub struct StaticDirectory(pub Vec<PodInfo>);

#[async_trait]
impl PodDirectory for StaticDirectory {
    async fn namespaces(&self) -> Result<Vec<String>, ExecError> {
        let mut namespaces: Vec<String> = self.0.iter().map(|p| p.namespace.clone()).collect();
        namespaces.sort();
        namespaces.dedup();
        Ok(namespaces)
    }

    async fn pods(&self, namespace: &str) -> Result<Vec<PodInfo>, ExecError> {
        Ok(self
            .0
            .iter()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect())
    }
}
