// ABOUTME: WebSocket halves adapted to the terminal frame source/sink traits
// Session status codes below 1000 are shifted into the private 4xxx close range

use crate::terminal::{FrameSink, FrameSource, TransportError};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

/// Close reasons are limited to 123 bytes by RFC 6455
const MAX_CLOSE_REASON: usize = 123;

/// WebSocket close code carrying a session status code
pub fn wire_close_code(code: u16) -> u16 {
    if code < 1000 {
        4000 + code
    } else {
        code
    }
}

fn truncate_reason(reason: &str) -> String {
    let mut end = reason.len().min(MAX_CLOSE_REASON);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

/// Split an upgraded socket into terminal transport halves
pub fn split(socket: WebSocket) -> (WebSocketSource, WebSocketSink) {
    let (sink, stream) = socket.split();
    (WebSocketSource(stream), WebSocketSink(sink))
}

pub struct WebSocketSource(SplitStream<WebSocket>);

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|e| TransportError(e.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // Ping/Pong handled by axum
                Some(Err(e)) => return Err(TransportError(e.to_string())),
            }
        }
    }
}

pub struct WebSocketSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: wire_close_code(code),
            reason: truncate_reason(reason).into(),
        };
        self.0
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let _ = self.0.flush().await;
        Ok(())
    }
}
