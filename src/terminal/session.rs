// ABOUTME: Per-connection terminal session state
// Holds the exec target, close flag, activity-refresh slot and size slot

use crate::exec::{ExecTarget, TerminalSize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Probing,
    Streaming,
    Failed,
    Closed,
}

/// Why a session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    IdleTimeout,
    StreamEnded,
    StreamFailed,
    ProbeFailed,
}

pub struct Session {
    pub id: Uuid,
    pub target: ExecTarget,
    /// Inactivity window after which the watchdog closes the session
    pub timeout: Duration,
    state: Mutex<SessionState>,
    closed: watch::Sender<Option<CloseReason>>,
    refresh_tx: mpsc::Sender<()>,
    refresh_rx: Mutex<Option<mpsc::Receiver<()>>>,
    size_tx: mpsc::Sender<TerminalSize>,
    size_rx: Mutex<Option<mpsc::Receiver<TerminalSize>>>,
}

impl Session {
    pub fn new(target: ExecTarget, timeout: Duration) -> Self {
        let (closed, _) = watch::channel(None);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (size_tx, size_rx) = mpsc::channel(1);

        Self {
            id: Uuid::new_v4(),
            target,
            timeout,
            state: Mutex::new(SessionState::Created),
            closed,
            refresh_tx,
            refresh_rx: Mutex::new(Some(refresh_rx)),
            size_tx,
            size_rx: Mutex::new(Some(size_rx)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.target.namespace
    }

    pub fn pod(&self) -> &str {
        &self.target.pod
    }

    pub fn container(&self) -> &str {
        &self.target.container
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Move to `next`. `Closed` is terminal and later transitions are ignored.
    pub fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == SessionState::Closed {
            return;
        }
        debug!("Session {} state {:?} -> {:?}", self.id, *state, next);
        *state = next;
    }

    /// Set the close flag. Returns `true` only for the call that closed the session.
    pub fn close(&self, reason: CloseReason) -> bool {
        let closed = self.closed.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if closed {
            debug!("Session {} closed: {:?}", self.id, reason);
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.borrow().is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.closed.borrow()
    }

    /// Resolves once the session has been closed by any path
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so `wait_for` only fails after the session is gone
        let _ = rx.wait_for(Option::is_some).await;
    }

    /// Note client activity. Dropped when a signal is already pending.
    pub fn signal_activity(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    pub(crate) fn take_refresh_receiver(&self) -> Option<mpsc::Receiver<()>> {
        self.refresh_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// Queue a terminal size. Returns `false` when the slot is full or already closed.
    pub fn offer_size(&self, size: TerminalSize) -> bool {
        self.size_tx.try_send(size).is_ok()
    }

    pub(crate) fn take_size_receiver(&self) -> Option<mpsc::Receiver<TerminalSize>> {
        self.size_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}
