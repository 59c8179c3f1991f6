// src/client/session.rs

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::core::{sleep_or_shutdown, TransportError};

/// Opens the byte stream the client writes frames into.
pub trait Connector: Send {
    type Stream: AsyncWrite + Unpin + Send;

    fn target(&self) -> &str;
    fn connect(&mut self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: &str, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.to_string(),
            connect_timeout,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn target(&self) -> &str {
        &self.addr
    }

    async fn connect(&mut self) -> io::Result<TcpStream> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(res) => res?,
            Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

/// One outbound connection, re-established with a fixed delay for as long as
/// the process runs.
pub struct TransportSession<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    state: ConnectionState,
    reconnect_delay: Duration,
    connect_attempts: u64,
    running: Arc<AtomicBool>,
}

impl<C: Connector> TransportSession<C> {
    pub fn new(connector: C, reconnect_delay: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            connector,
            stream: None,
            state: ConnectionState::Disconnected,
            reconnect_delay,
            connect_attempts: 0,
            running,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Returns once connected. Fails only with `NotConnected` when shutdown
    /// interrupts the retry loop.
    pub async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        while self.stream.is_none() {
            if !self.running.load(Ordering::Relaxed) {
                return Err(TransportError::NotConnected);
            }

            self.state = ConnectionState::Connecting;
            self.connect_attempts += 1;
            log::info!(
                "[session] connecting to {} (attempt {})",
                self.connector.target(),
                self.connect_attempts
            );

            match self.connector.connect().await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    log::info!("[session] connected to {}", self.connector.target());
                }
                Err(source) => {
                    self.state = ConnectionState::Disconnected;
                    let err = TransportError::Connect {
                        addr: self.connector.target().to_string(),
                        source,
                    };
                    log::warn!("[session] {}, retry in {:?}", err, self.reconnect_delay);
                    if !sleep_or_shutdown(self.reconnect_delay, self.running.clone()).await {
                        return Err(TransportError::NotConnected);
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes one framed payload and flushes. On failure the connection is
    /// dropped; the frame is not retried.
    pub async fn send(&mut self, wire: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let res = async {
            stream.write_all(wire).await?;
            stream.flush().await
        }
        .await;

        match res {
            Ok(()) => {
                self.state = ConnectionState::Streaming;
                Ok(())
            }
            Err(e) => {
                self.disconnect();
                Err(TransportError::Io(e))
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            log::warn!("[session] connection to {} dropped", self.connector.target());
        }
        self.state = ConnectionState::Disconnected;
    }
}
