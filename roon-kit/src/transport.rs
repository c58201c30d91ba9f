// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! An abstraction over a duplex binary WebSocket, so the connection engine can be
//! driven deterministically in tests against a fake implementation.

use crate::error::Error;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// A single message received from a [`Transport`].
#[derive(Debug, Clone)]
pub enum Message {
    /// A text frame; treated identically to [`Message::Binary`] once decoded as UTF-8.
    Text(String),
    /// A binary frame; the Core always sends these.
    Binary(Vec<u8>),
}

impl Message {
    /// The bytes to hand to [`crate::codec::decode`], regardless of frame kind.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(s) => s.into_bytes(),
            Message::Binary(b) => b,
        }
    }
}

/// A duplex binary WebSocket. Implementations must be safe to use from two
/// concurrent contexts: one sender, one receiver.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver one frame.
    async fn send(&self, bytes: Vec<u8>) -> Result<(), Error>;

    /// Block until one frame is available. Returns an error once the transport
    /// is closed, locally or remotely.
    async fn receive(&self) -> Result<Message, Error>;

    /// Best-effort ping; the Core drives its own keepalive in practice, so
    /// implementations may treat this as a no-op.
    async fn send_ping(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Idempotent close. Causes any outstanding [`Transport::receive`] to fail
    /// with a [`Error::ConnectionClosed`].
    async fn close(&self, code: u16, reason: Option<String>) -> Result<(), Error>;
}

/// A [`Transport`] backed by `tokio-tungstenite`, talking to `ws://<host>:<port>/api`.
pub struct WebSocketTransport {
    write: tokio::sync::Mutex<
        futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
            tungstenite::Message,
        >,
    >,
    read: tokio::sync::Mutex<
        futures_util::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        >,
    >,
    // Closing the write sink alone only shuts down our half of the TCP
    // connection; a peer that has gone silent without acking our close frame
    // would otherwise leave a concurrent `receive()` blocked on `read.next()`
    // forever. `close()` notifies this so `receive()` unblocks unconditionally,
    // which is what lets the watchdog's forced close actually terminate the
    // receive loop.
    close_notify: tokio::sync::Notify,
}

impl WebSocketTransport {
    /// Connect to a Roon Core's MOO/1 endpoint.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
        let (write, read) = stream.split();
        Ok(Self {
            write: tokio::sync::Mutex::new(write),
            read: tokio::sync::Mutex::new(read),
            close_notify: tokio::sync::Notify::new(),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), Error> {
        let mut write = self.write.lock().await;
        write
            .send(tungstenite::Message::Binary(bytes))
            .await
            .map_err(|e| Error::ConnectionFailed(e.to_string()))
    }

    async fn receive(&self) -> Result<Message, Error> {
        let mut read = self.read.lock().await;
        loop {
            let next = tokio::select! {
                next = read.next() => next,
                _ = self.close_notify.notified() => {
                    return Err(Error::ConnectionClosed { code: 0, reason: Some("closed".into()) });
                }
            };
            match next {
                Some(Ok(tungstenite::Message::Binary(b))) => return Ok(Message::Binary(b)),
                Some(Ok(tungstenite::Message::Text(s))) => return Ok(Message::Text(s)),
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => continue,
                Some(Ok(tungstenite::Message::Frame(_))) => continue,
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), Some(f.reason.to_string())))
                        .unwrap_or((0, None));
                    return Err(Error::ConnectionClosed { code, reason });
                }
                Some(Err(e)) => {
                    return Err(Error::ConnectionClosed {
                        code: 0,
                        reason: Some(e.to_string()),
                    })
                }
                None => {
                    return Err(Error::ConnectionClosed {
                        code: 0,
                        reason: None,
                    })
                }
            }
        }
    }

    async fn send_ping(&self) -> Result<(), Error> {
        let mut write = self.write.lock().await;
        write
            .send(tungstenite::Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| Error::ConnectionFailed(e.to_string()))
    }

    async fn close(&self, code: u16, reason: Option<String>) -> Result<(), Error> {
        {
            let mut write = self.write.lock().await;
            let frame = tungstenite::protocol::CloseFrame {
                code: tungstenite::protocol::frame::coding::CloseCode::from(code),
                reason: reason.unwrap_or_default().into(),
            };
            // Idempotent: a second close on an already-closed sink is a no-op error we swallow.
            let _ = write.send(tungstenite::Message::Close(Some(frame))).await;
            let _ = write.close().await;
        }
        self.close_notify.notify_waiters();
        Ok(())
    }
}
