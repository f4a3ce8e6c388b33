// ABOUTME: Drives the interactive exec stream for a terminal session
// Wires the socket adapter, size negotiator and idle watchdog to the remote process

use super::adapter::{terminal_error, TransportAdapter};
use super::error::{TerminalError, CLOSE_EXEC_FAILED, CLOSE_IDLE_TIMEOUT, CLOSE_NORMAL};
use super::session::CloseReason;
use super::size::SizeNegotiator;
use super::watchdog::Watchdog;
use crate::exec::{ExecError, RemoteExec, StreamOptions, TerminalSize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Aborts the session's background tasks however the bridge exits
struct SessionTasks {
    watchdog: Option<JoinHandle<()>>,
    stream: Option<JoinHandle<Result<(), ExecError>>>,
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
        if let Some(handle) = self.stream.take() {
            handle.abort();
        }
    }
}

pub struct ExecStreamBridge {
    exec: Arc<dyn RemoteExec>,
    initial_size: TerminalSize,
}

impl ExecStreamBridge {
    pub fn new(exec: Arc<dyn RemoteExec>, initial_size: TerminalSize) -> Self {
        Self { exec, initial_size }
    }

    /// Run `command` with a tty attached to the client socket until it ends.
    /// The socket is closed on every exit path.
    pub async fn run(
        &self,
        adapter: Arc<TransportAdapter>,
        command: Vec<String>,
    ) -> Result<(), TerminalError> {
        let session = adapter.session().clone();
        let Some(watchdog) = Watchdog::new(adapter.clone()) else {
            let err = TerminalError::SessionClosed;
            adapter.close(CLOSE_EXEC_FAILED, &err.to_string()).await;
            return Err(err);
        };
        let negotiator = SizeNegotiator::for_session(&session);
        session.offer_size(self.initial_size);

        let mut tasks = SessionTasks {
            watchdog: Some(watchdog.spawn()),
            stream: None,
        };

        let stream = {
            let exec = self.exec.clone();
            let adapter = adapter.clone();
            let target = session.target.clone();
            tokio::spawn(async move {
                exec.stream(
                    &target,
                    &command,
                    StreamOptions {
                        stdin: Some(&*adapter),
                        stdout: &*adapter,
                        stderr: &*adapter,
                        size_queue: Some(&negotiator),
                        tty: true,
                    },
                )
                .await
            })
        };
        let joined = tasks.stream.insert(stream).await;
        drop(tasks);

        let outcome = match joined {
            Ok(result) => result.map_err(TerminalError::from),
            Err(e) => Err(TerminalError::StreamTask(e.to_string())),
        };
        self.finish(&adapter, outcome).await
    }

    async fn finish(
        &self,
        adapter: &TransportAdapter,
        outcome: Result<(), TerminalError>,
    ) -> Result<(), TerminalError> {
        let session = adapter.session();
        let outcome = match outcome {
            Err(TerminalError::RemoteStream(ExecError::InputTerminated(e)))
                if matches!(terminal_error(&e), Some(TerminalError::PeerClosed)) =>
            {
                info!("Client left session {}", session.id);
                Ok(())
            }
            other => other,
        };

        let reason = if outcome.is_ok() {
            CloseReason::StreamEnded
        } else {
            CloseReason::StreamFailed
        };
        if !session.close(reason) && session.close_reason() == Some(CloseReason::IdleTimeout) {
            adapter
                .close(CLOSE_IDLE_TIMEOUT, "connection need to be closed.")
                .await;
            return Err(TerminalError::IdleTimeout(session.timeout));
        }

        match outcome {
            Ok(()) => {
                info!("Session {} finished", session.id);
                adapter.close(CLOSE_NORMAL, "session finished").await;
                Ok(())
            }
            Err(e) => {
                error!("Session {} failed: {}", session.id, e);
                adapter.close(e.close_code(), &e.to_string()).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecTarget, StreamOptions};
    use crate::terminal::session::Session;
    use crate::terminal::transport::{channel_socket, SocketEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingExec {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteExec for CountingExec {
        async fn stream(
            &self,
            _target: &ExecTarget,
            _command: &[String],
            _options: StreamOptions<'_>,
        ) -> Result<(), ExecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_refresh_slot_still_closes_socket() {
        let (mut peer, source, sink) = channel_socket();
        let session = Arc::new(Session::new(
            ExecTarget {
                namespace: "default".to_string(),
                pod: "web-0".to_string(),
                container: "nginx".to_string(),
            },
            Duration::from_secs(60),
        ));
        // Another watchdog already owns the refresh slot
        let _refresh = session.take_refresh_receiver().unwrap();
        let adapter = Arc::new(TransportAdapter::new(session, Box::new(source), Box::new(sink)));

        let exec = Arc::new(CountingExec::default());
        let bridge = ExecStreamBridge::new(exec.clone(), TerminalSize { width: 150, height: 50 });
        let err = bridge.run(adapter, vec!["sh".to_string()]).await.unwrap_err();

        assert!(matches!(err, TerminalError::SessionClosed));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            peer.drain_events().as_slice(),
            [SocketEvent::Close { code: 126, .. }]
        ));
    }

    #[tokio::test]
    async fn test_finished_stream_closes_normally() {
        let (mut peer, source, sink) = channel_socket();
        let session = Arc::new(Session::new(
            ExecTarget {
                namespace: "default".to_string(),
                pod: "web-0".to_string(),
                container: "nginx".to_string(),
            },
            Duration::from_secs(60),
        ));
        let adapter = Arc::new(TransportAdapter::new(session, Box::new(source), Box::new(sink)));

        let exec = Arc::new(CountingExec::default());
        let bridge = ExecStreamBridge::new(exec.clone(), TerminalSize { width: 150, height: 50 });
        bridge.run(adapter, vec!["sh".to_string()]).await.unwrap();

        assert_eq!(exec.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            peer.drain_events(),
            vec![SocketEvent::Close {
                code: 1000,
                reason: "session finished".to_string()
            }]
        );
    }
}
