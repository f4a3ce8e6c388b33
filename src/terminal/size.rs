// ABOUTME: One-shot terminal size source for the exec stream
// Delivers the first queued size, then closes the slot so later resizes are dropped

use super::session::Session;
use crate::exec::{TerminalSize, TerminalSizeQueue};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

pub struct SizeNegotiator {
    slot: Mutex<Option<mpsc::Receiver<TerminalSize>>>,
}

impl SizeNegotiator {
    /// Take over the session's size slot. A slot already taken yields no sizes.
    pub fn for_session(session: &Session) -> Self {
        Self {
            slot: Mutex::new(session.take_size_receiver()),
        }
    }

    /// Wait for the first size. Every later call returns `None`.
    pub async fn next_size(&self) -> Option<TerminalSize> {
        let mut slot = self.slot.lock().await;
        let receiver = slot.as_mut()?;
        let size = receiver.recv().await;
        // Dropping the receiver closes the slot for good
        *slot = None;
        if let Some(size) = size {
            debug!("Initial terminal size {}x{}", size.width, size.height);
        }
        size
    }
}

#[async_trait]
impl TerminalSizeQueue for SizeNegotiator {
    async fn next_size(&self) -> Option<TerminalSize> {
        Self::next_size(self).await
    }
}
