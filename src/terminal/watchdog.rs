// ABOUTME: Idle timeout watchdog for terminal sessions
// Closes a session once no client input has been seen for the configured window

use super::adapter::TransportAdapter;
use super::session::{CloseReason, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct Watchdog {
    session: Arc<Session>,
    adapter: Arc<TransportAdapter>,
    refresh: mpsc::Receiver<()>,
    timeout: Duration,
}

impl Watchdog {
    /// `None` when the session's refresh slot is already owned by another watchdog
    pub fn new(adapter: Arc<TransportAdapter>) -> Option<Self> {
        let session = adapter.session().clone();
        let refresh = session.take_refresh_receiver()?;
        let timeout = session.timeout;
        Some(Self {
            session,
            adapter,
            refresh,
            timeout,
        })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Wait for inactivity. The deadline is `last activity + timeout`.
    pub async fn run(mut self) {
        let idle = tokio::time::sleep(self.timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                () = &mut idle => {
                    warn!(
                        "Session {} idle for {:?}, connection need to be closed",
                        self.session.id, self.timeout
                    );
                    if self.session.close(CloseReason::IdleTimeout) {
                        // A read on a closed session closes the socket and wakes the stdin pump
                        let _ = self.adapter.read(&mut []).await;
                    }
                    return;
                }
                signal = self.refresh.recv() => {
                    if signal.is_none() {
                        return;
                    }
                    idle.as_mut().reset(Instant::now() + self.timeout);
                }
                () = self.session.closed() => {
                    debug!("Session {} closed, watchdog exiting", self.session.id);
                    return;
                }
            }
        }
    }
}
