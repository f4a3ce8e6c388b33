// ABOUTME: Byte-stream facade over the message-framed terminal socket
// Exec stdin reads decode client envelopes; stdout/stderr writes become stdout envelopes

use super::error::{TerminalError, CLOSE_IDLE_TIMEOUT};
use super::protocol::{Operation, TerminalMessage};
use super::session::{CloseReason, Session};
use super::transport::{FrameSink, FrameSource};
use crate::exec::{ExecInput, ExecOutput, ReadOutcome, TerminalSize};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Byte handed to the remote process when the session ends (Ctrl-D)
pub const END_OF_TRANSMISSION: u8 = 0x04;

pub struct TransportAdapter {
    session: Arc<Session>,
    reader: Mutex<ReaderState>,
    writer: Mutex<WriterState>,
}

struct ReaderState {
    source: Box<dyn FrameSource>,
    /// Stdin bytes that did not fit into the caller's last buffer
    pending: Vec<u8>,
}

struct WriterState {
    sink: Box<dyn FrameSink>,
    closed: bool,
    /// Trailing bytes of an incomplete UTF-8 sequence from the last write
    partial: Vec<u8>,
}

impl WriterState {
    fn take_text(&mut self, data: &[u8]) -> String {
        self.partial.extend_from_slice(data);
        let complete = match std::str::from_utf8(&self.partial) {
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            _ => self.partial.len(),
        };
        let rest = self.partial.split_off(complete);
        let text = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial = rest;
        text
    }
}

fn terminated(buf: &mut [u8], error: TerminalError) -> ReadOutcome {
    let written = match buf.first_mut() {
        Some(byte) => {
            *byte = END_OF_TRANSMISSION;
            1
        }
        None => 0,
    };
    ReadOutcome::Terminated {
        written,
        error: io::Error::other(error),
    }
}

impl TransportAdapter {
    pub fn new(
        session: Arc<Session>,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        Self {
            session,
            reader: Mutex::new(ReaderState {
                source,
                pending: Vec::new(),
            }),
            writer: Mutex::new(WriterState {
                sink,
                closed: false,
                partial: Vec::new(),
            }),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Read client input into `buf`.
    ///
    /// A closed session never touches the socket: it yields the end-of-transmission
    /// sentinel straight away, and closes the socket with 128 when the closure was
    /// an idle timeout. Otherwise activity is signalled before waiting for the next
    /// frame. `resize` frames produce zero bytes.
    pub async fn read(&self, buf: &mut [u8]) -> ReadOutcome {
        if self.session.is_closed() {
            if self.session.close_reason() == Some(CloseReason::IdleTimeout) {
                self.close(CLOSE_IDLE_TIMEOUT, "connection need to be closed.")
                    .await;
            }
            return terminated(buf, TerminalError::SessionClosed);
        }
        self.session.signal_activity();

        let mut reader = self.reader.lock().await;
        if !reader.pending.is_empty() {
            let n = buf.len().min(reader.pending.len());
            buf[..n].copy_from_slice(&reader.pending[..n]);
            reader.pending.drain(..n);
            return ReadOutcome::Data(n);
        }

        let received = tokio::select! {
            received = reader.source.recv() => received,
            () = self.session.closed() => return terminated(buf, TerminalError::SessionClosed),
        };
        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => return terminated(buf, TerminalError::PeerClosed),
            Err(e) => {
                error!("Failed to receive terminal message: {}", e);
                return terminated(buf, TerminalError::Transport(e.to_string()));
            }
        };

        let message = match TerminalMessage::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping session on malformed message: {}", e);
                return terminated(buf, TerminalError::Decode(e));
            }
        };

        match message.op {
            Operation::Stdin => {
                let data = message.data.as_bytes();
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
                reader.pending.extend_from_slice(&data[n..]);
                ReadOutcome::Data(n)
            }
            Operation::Resize => {
                // Only the initial size is applied; later resizes are dropped by the closed slot
                if let (Some(rows), Some(cols)) = (message.rows, message.cols) {
                    let size = TerminalSize {
                        width: cols,
                        height: rows,
                    };
                    if !self.session.offer_size(size) {
                        debug!("Ignoring resize to {}x{}", cols, rows);
                    }
                }
                ReadOutcome::Data(0)
            }
            other => terminated(buf, TerminalError::UnknownOperation(other.to_string())),
        }
    }

    /// Send process output to the client as a `stdout` envelope
    pub async fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut writer = self.writer.lock().await;
        if writer.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                TerminalError::SessionClosed,
            ));
        }

        let text = writer.take_text(data);
        if text.is_empty() {
            return Ok(data.len());
        }

        let frame = TerminalMessage::stdout(text)
            .encode()
            .map_err(io::Error::other)?;
        if let Err(e) = writer.sink.send(frame).await {
            error!("Failed to send terminal output: {}", e);
            return Err(io::Error::other(e));
        }
        Ok(data.len())
    }

    /// Close the client socket, flushing any held-back output first.
    /// Only the first call reaches the socket.
    pub async fn close(&self, code: u16, reason: &str) {
        let mut writer = self.writer.lock().await;
        if writer.closed {
            return;
        }
        writer.closed = true;
        if !writer.partial.is_empty() {
            let tail = String::from_utf8_lossy(&std::mem::take(&mut writer.partial)).into_owned();
            if let Ok(frame) = TerminalMessage::stdout(tail).encode() {
                if let Err(e) = writer.sink.send(frame).await {
                    debug!("Dropping output tail on close: {}", e);
                }
            }
        }
        debug!("Closing terminal socket with {}: {}", code, reason);
        if let Err(e) = writer.sink.close(code, reason).await {
            debug!("Socket already gone while closing: {}", e);
        }
    }
}

#[async_trait]
impl ExecInput for TransportAdapter {
    async fn read(&self, buf: &mut [u8]) -> ReadOutcome {
        Self::read(self, buf).await
    }
}

#[async_trait]
impl ExecOutput for TransportAdapter {
    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        Self::write(self, data).await
    }
}

/// The terminal error carried by a terminated read, if any
pub fn terminal_error(error: &io::Error) -> Option<&TerminalError> {
    error.get_ref()?.downcast_ref::<TerminalError>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecTarget;
    use crate::terminal::transport::{channel_socket, ChannelPeer, SocketEvent};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn adapter() -> (ChannelPeer, TransportAdapter) {
        let (peer, source, sink) = channel_socket();
        let session = Arc::new(Session::new(
            ExecTarget {
                namespace: "default".to_string(),
                pod: "web-0".to_string(),
                container: "nginx".to_string(),
            },
            Duration::from_secs(60),
        ));
        (peer, TransportAdapter::new(session, Box::new(source), Box::new(sink)))
    }

    fn expect_terminated(outcome: ReadOutcome) -> io::Error {
        match outcome {
            ReadOutcome::Terminated { written, error } => {
                assert_eq!(written, 1);
                error
            }
            ReadOutcome::Data(n) => panic!("expected termination, got {} bytes", n),
        }
    }

    #[tokio::test]
    async fn test_stdin_is_copied() {
        let (peer, adapter) = adapter();
        peer.send(&TerminalMessage::stdin("ls\r"));

        let mut buf = [0u8; 16];
        let outcome = adapter.read(&mut buf).await;
        assert!(matches!(outcome, ReadOutcome::Data(3)));
        assert_eq!(&buf[..3], b"ls\r");
    }

    #[tokio::test]
    async fn test_oversized_stdin_is_served_across_reads() {
        let (peer, adapter) = adapter();
        peer.send(&TerminalMessage::stdin("abcdef"));

        let mut buf = [0u8; 4];
        assert!(matches!(adapter.read(&mut buf).await, ReadOutcome::Data(4)));
        assert_eq!(&buf, b"abcd");
        assert!(matches!(adapter.read(&mut buf).await, ReadOutcome::Data(2)));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(peer.recv_calls(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_skips_transport() {
        let (mut peer, adapter) = adapter();
        adapter.session().close(CloseReason::StreamEnded);

        for _ in 0..3 {
            let mut buf = [0u8; 8];
            let error = expect_terminated(adapter.read(&mut buf).await);
            assert_eq!(buf[0], END_OF_TRANSMISSION);
            assert!(matches!(
                terminal_error(&error),
                Some(TerminalError::SessionClosed)
            ));
        }
        assert_eq!(peer.recv_calls(), 0);
        assert!(peer.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_idle_closure_closes_socket_once_with_128() {
        let (mut peer, adapter) = adapter();
        adapter.session().close(CloseReason::IdleTimeout);

        let mut empty: [u8; 0] = [];
        let outcome = adapter.read(&mut empty).await;
        assert!(matches!(outcome, ReadOutcome::Terminated { written: 0, .. }));
        let _ = adapter.read(&mut [0u8; 4]).await;

        assert_eq!(
            peer.drain_events(),
            vec![SocketEvent::Close {
                code: 128,
                reason: "connection need to be closed.".to_string()
            }]
        );
        assert_eq!(peer.recv_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_terminates() {
        let (peer, adapter) = adapter();
        peer.send_raw(r#"{"Op":"exec","Data":"rm -rf /"}"#);

        let mut buf = [0u8; 8];
        let error = expect_terminated(adapter.read(&mut buf).await);
        assert_eq!(buf[0], END_OF_TRANSMISSION);
        assert!(matches!(
            terminal_error(&error),
            Some(TerminalError::UnknownOperation(op)) if op == "exec"
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_terminates() {
        let (peer, adapter) = adapter();
        peer.send_raw("{\"Op\":");

        let mut buf = [0u8; 8];
        let error = expect_terminated(adapter.read(&mut buf).await);
        assert!(matches!(terminal_error(&error), Some(TerminalError::Decode(_))));
    }

    #[tokio::test]
    async fn test_peer_hangup_terminates() {
        let (mut peer, adapter) = adapter();
        peer.disconnect();

        let mut buf = [0u8; 8];
        let error = expect_terminated(adapter.read(&mut buf).await);
        assert!(matches!(terminal_error(&error), Some(TerminalError::PeerClosed)));
    }

    #[tokio::test]
    async fn test_resize_reads_zero_bytes_and_fills_slot_once() {
        let (peer, adapter) = adapter();
        peer.send(&TerminalMessage::resize(120, 40));
        peer.send(&TerminalMessage::resize(200, 60));

        let mut buf = [0u8; 8];
        assert!(matches!(adapter.read(&mut buf).await, ReadOutcome::Data(0)));
        assert!(matches!(adapter.read(&mut buf).await, ReadOutcome::Data(0)));

        let mut sizes = adapter.session().take_size_receiver().unwrap();
        assert_eq!(
            sizes.try_recv().ok(),
            Some(TerminalSize {
                width: 120,
                height: 40
            })
        );
        assert!(sizes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_signals_activity() {
        let (peer, adapter) = adapter();
        let mut refresh = adapter.session().take_refresh_receiver().unwrap();
        peer.send(&TerminalMessage::stdin("x"));

        let mut buf = [0u8; 8];
        let _ = adapter.read(&mut buf).await;
        assert!(refresh.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_close_while_blocked_unblocks_read() {
        let (_peer, adapter) = adapter();
        let adapter = Arc::new(adapter);

        let reader = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8];
                let outcome = adapter.read(&mut buf).await;
                (outcome, buf[0])
            })
        };
        tokio::task::yield_now().await;
        adapter.session().close(CloseReason::StreamFailed);

        let (outcome, first) = reader.await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Terminated { written: 1, .. }));
        assert_eq!(first, END_OF_TRANSMISSION);
    }

    #[tokio::test]
    async fn test_write_wraps_stdout() {
        let (mut peer, adapter) = adapter();
        assert_eq!(adapter.write(b"hello\n").await.unwrap(), 6);

        assert_eq!(
            peer.next_event().await,
            Some(SocketEvent::Frame(r#"{"Op":"stdout","Data":"hello\n"}"#.to_string()))
        );
    }

    #[tokio::test]
    async fn test_write_holds_back_split_utf8() {
        let (mut peer, adapter) = adapter();
        let bytes = "é!".as_bytes();

        adapter.write(&bytes[..1]).await.unwrap();
        adapter.write(&bytes[1..]).await.unwrap();

        let frames = peer.drain_events();
        assert_eq!(
            frames,
            vec![SocketEvent::Frame(
                TerminalMessage::stdout("é!").encode().unwrap()
            )]
        );
    }

    #[tokio::test]
    async fn test_close_flushes_incomplete_utf8_tail() {
        let (mut peer, adapter) = adapter();
        let bytes = "ok é".as_bytes();

        adapter.write(&bytes[..bytes.len() - 1]).await.unwrap();
        adapter.close(1000, "session finished").await;

        assert_eq!(
            peer.drain_events(),
            vec![
                SocketEvent::Frame(TerminalMessage::stdout("ok ").encode().unwrap()),
                SocketEvent::Frame(TerminalMessage::stdout("\u{FFFD}").encode().unwrap()),
                SocketEvent::Close {
                    code: 1000,
                    reason: "session finished".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let (peer, adapter) = adapter();
        drop(peer);
        assert!(adapter.write(b"lost").await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut peer, adapter) = adapter();
        adapter.close(126, "boom").await;
        adapter.close(1000, "done").await;

        assert_eq!(
            peer.drain_events(),
            vec![SocketEvent::Close {
                code: 126,
                reason: "boom".to_string()
            }]
        );
        assert!(adapter.write(b"late").await.is_err());
    }
}
