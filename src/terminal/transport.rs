// ABOUTME: Message-framed socket abstraction used by terminal sessions
// The WebSocket server and the in-memory channel socket both implement it

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::protocol::TerminalMessage;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Receiving half of a message-framed socket
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame, `Ok(None)` once the peer has closed the connection
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// Sending half of a message-framed socket
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Terminate the connection with a session status code and reason
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// What the server side emitted on a channel socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Frame(String),
    Close { code: u16, reason: String },
}

/// In-memory socket. Returns the peer (client) end plus the server halves.
pub fn channel_socket() -> (ChannelPeer, ChannelSource, ChannelSink) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();
    let recv_calls = Arc::new(AtomicUsize::new(0));

    (
        ChannelPeer {
            to_server: Some(to_server),
            from_server,
            recv_calls: recv_calls.clone(),
        },
        ChannelSource {
            inbound,
            recv_calls,
        },
        ChannelSink { outbound },
    )
}

pub struct ChannelSource {
    inbound: mpsc::UnboundedReceiver<String>,
    recv_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        self.recv_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inbound.recv().await)
    }
}

pub struct ChannelSink {
    outbound: mpsc::UnboundedSender<SocketEvent>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(SocketEvent::Frame(frame))
            .map_err(|_| TransportError("peer dropped".to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.outbound
            .send(SocketEvent::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| TransportError("peer dropped".to_string()))
    }
}

/// Client end of a channel socket
pub struct ChannelPeer {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<SocketEvent>,
    recv_calls: Arc<AtomicUsize>,
}

impl ChannelPeer {
    pub fn send(&self, message: &TerminalMessage) {
        if let Ok(frame) = message.encode() {
            self.send_raw(frame);
        }
    }

    pub fn send_raw(&self, frame: impl Into<String>) {
        if let Some(tx) = &self.to_server {
            let _ = tx.send(frame.into());
        }
    }

    /// Hang up: the server's next receive sees the connection closed
    pub fn disconnect(&mut self) {
        self.to_server = None;
    }

    /// How many times the server has asked the socket for a frame
    pub fn recv_calls(&self) -> usize {
        self.recv_calls.load(Ordering::SeqCst)
    }

    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        self.from_server.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SocketEvent> {
        self.from_server.try_recv().ok()
    }

    /// Drain everything emitted so far
    pub fn drain_events(&mut self) -> Vec<SocketEvent> {
        std::iter::from_fn(|| self.try_next_event()).collect()
    }
}
