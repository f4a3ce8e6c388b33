// ABOUTME: Top-level orchestration of a terminal session
// Validates the request, probes for a shell, then hands the socket to the exec bridge

use super::adapter::TransportAdapter;
use super::bridge::ExecStreamBridge;
use super::error::{TerminalError, CLOSE_EXEC_FAILED};
use super::prober::ShellProber;
use super::session::{CloseReason, Session, SessionState};
use super::transport::{FrameSink, FrameSource};
use crate::config::TerminalConfig;
use crate::exec::{ExecTarget, RemoteExec, TerminalSize};
use futures_util::FutureExt;
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

/// Query parameters identifying the container to open a terminal in
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TerminalRequest {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl TerminalRequest {
    pub fn validate(&self) -> Result<ExecTarget, TerminalError> {
        let missing: Vec<&str> = [
            ("namespace", &self.namespace),
            ("pod", &self.pod),
            ("container", &self.container),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(TerminalError::InvalidRequest(format!(
                "{} cannot be empty",
                missing.join(", ")
            )));
        }

        Ok(ExecTarget {
            namespace: self.namespace.clone(),
            pod: self.pod.clone(),
            container: self.container.clone(),
        })
    }
}

pub struct SessionController {
    exec: Arc<dyn RemoteExec>,
    config: TerminalConfig,
}

impl SessionController {
    pub fn new(exec: Arc<dyn RemoteExec>, config: TerminalConfig) -> Self {
        Self { exec, config }
    }

    /// Serve one terminal connection until it ends
    pub async fn run(
        &self,
        request: TerminalRequest,
        source: Box<dyn FrameSource>,
        mut sink: Box<dyn FrameSink>,
    ) -> Result<(), TerminalError> {
        let target = match request.validate() {
            Ok(target) => target,
            Err(e) => {
                let _ = sink.close(CLOSE_EXEC_FAILED, &e.to_string()).await;
                return Err(e);
            }
        };

        let session = Arc::new(Session::new(target, self.config.idle_timeout()));
        let span = info_span!(
            "terminal",
            session = %session.id,
            namespace = %session.namespace(),
            pod = %session.pod(),
            container = %session.container(),
        );
        let adapter = Arc::new(TransportAdapter::new(session.clone(), source, sink));

        async {
            info!("Exec received request");
            let result = AssertUnwindSafe(self.drive(&adapter)).catch_unwind().await;
            session.set_state(SessionState::Closed);

            match result {
                Ok(result) => result,
                Err(_) => {
                    error!("Terminal session panicked");
                    session.close(CloseReason::StreamFailed);
                    adapter
                        .close(CLOSE_EXEC_FAILED, "internal error")
                        .await;
                    Err(TerminalError::StreamTask("session panicked".to_string()))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, adapter: &Arc<TransportAdapter>) -> Result<(), TerminalError> {
        let session = adapter.session();

        session.set_state(SessionState::Probing);
        let prober = ShellProber::new(self.exec.clone(), self.config.shell_dir.clone());
        let shell = match prober.probe(&session.target).await {
            Ok(shell) => shell,
            Err(e) => {
                session.set_state(SessionState::Failed);
                session.close(CloseReason::ProbeFailed);
                adapter.close(e.close_code(), &e.to_string()).await;
                return Err(e);
            }
        };

        session.set_state(SessionState::Streaming);
        let bridge = ExecStreamBridge::new(
            self.exec.clone(),
            TerminalSize {
                width: self.config.initial_cols,
                height: self.config.initial_rows,
            },
        );
        bridge.run(adapter.clone(), shell).await
    }
}
