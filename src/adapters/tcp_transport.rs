//! TCP transport adapter.
//!
//! Implements [`Transport`] over a plain `std::net::TcpStream` to the
//! broker.
//!
//! ## Connection model
//!
//! 1. `open()` hands name resolution and the TCP handshake to a task on
//!    the tokio runtime, bounded by the connect timeout, and returns at
//!    once.
//! 2. `poll_open()` checks that task without waiting.  When it finishes
//!    the socket is taken back as a non-blocking std stream with
//!    `TCP_NODELAY`.
//! 3. `read()` returns `Ok(0)` when no data is available and
//!    [`TransportError::Closed`] on EOF.
//! 4. `write()` queues bytes; anything the socket does not take right away
//!    stays in an outbound buffer that `flush()` keeps draining.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use futures_lite::future;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::mqtt::transport::Transport;

/// Refuse to queue more than this much unsent output.
const MAX_PENDING: usize = 64 * 1024;

// ───────────────────────────────────────────────────────────────
// Connector
// ───────────────────────────────────────────────────────────────

/// One outstanding connect attempt, run on the runtime and polled from the
/// event loop.  Shared by the TCP and TLS transports.
pub struct Connector {
    runtime: Handle,
    host: String,
    port: u16,
    timeout: Duration,
    task: Option<JoinHandle<Result<TcpStream, TransportError>>>,
}

impl Connector {
    pub fn new(runtime: Handle, host: impl Into<String>, port: u16, timeout_ms: u32) -> Self {
        Self {
            runtime,
            host: host.into(),
            port,
            timeout: Duration::from_millis(u64::from(timeout_ms.max(1))),
            task: None,
        }
    }

    pub fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_some()
    }

    /// Start a fresh attempt, abandoning any earlier one.
    pub fn start(&mut self) {
        self.cancel();
        let host = self.host.clone();
        let port = self.port;
        let timeout = self.timeout;
        debug!("TCP: connecting to {}:{} (timeout {:?})", host, port, timeout);
        self.task = Some(self.runtime.spawn(async move {
            let stream = match tokio::time::timeout(
                timeout,
                tokio::net::TcpStream::connect((host.as_str(), port)),
            )
            .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!("TCP: connect to {}:{} failed: {}", host, port, e);
                    return Err(TransportError::ConnectFailed);
                }
                Err(_) => {
                    warn!("TCP: connect to {}:{} timed out", host, port);
                    return Err(TransportError::ConnectFailed);
                }
            };
            // Hands back a socket already in non-blocking mode.
            let stream = stream.into_std().map_err(|_| TransportError::Io)?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!("TCP: TCP_NODELAY not set: {}", e);
            }
            Ok(stream)
        }));
    }

    /// `Ok(None)` while the attempt is still running.
    pub fn poll(&mut self) -> Result<Option<TcpStream>, TransportError> {
        let task = self.task.as_mut().ok_or(TransportError::NotConnected)?;
        match future::block_on(future::poll_once(task)) {
            None => Ok(None),
            Some(joined) => {
                self.task = None;
                match joined {
                    Ok(result) => result.map(Some),
                    Err(e) => {
                        warn!("TCP: connect task failed: {}", e);
                        Err(TransportError::ConnectFailed)
                    }
                }
            }
        }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ───────────────────────────────────────────────────────────────
// TcpTransport
// ───────────────────────────────────────────────────────────────

pub struct TcpTransport {
    connector: Connector,
    stream: Option<TcpStream>,
    /// Bytes accepted by `write()` but not yet taken by the socket.
    pending: Vec<u8>,
}

impl TcpTransport {
    pub fn new(runtime: Handle, host: impl Into<String>, port: u16, connect_timeout_ms: u32) -> Self {
        Self {
            connector: Connector::new(runtime, host, port, connect_timeout_ms),
            stream: None,
            pending: Vec::new(),
        }
    }

    pub fn peer(&self) -> String {
        self.connector.peer()
    }

    /// Bytes still waiting to be written.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn drop_connection(&mut self) {
        self.connector.cancel();
        if self.stream.take().is_some() {
            info!("TCP: connection to {} closed", self.peer());
        }
        self.pending.clear();
    }

    /// Write as much of `pending` as the socket accepts now.
    fn drain(&mut self) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        while !self.pending.is_empty() {
            match stream.write(&self.pending) {
                Ok(0) => {
                    self.drop_connection();
                    return Err(TransportError::Closed);
                }
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("TCP: write error: {}", e);
                    self.drop_connection();
                    return Err(TransportError::Io);
                }
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.drop_connection();
        self.connector.start();
        Ok(())
    }

    fn poll_open(&mut self) -> Result<bool, TransportError> {
        if self.stream.is_some() {
            return Ok(true);
        }
        match self.connector.poll()? {
            Some(stream) => {
                info!("TCP: connected to {}", self.peer());
                self.stream = Some(stream);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        match stream.read(buf) {
            Ok(0) if !buf.is_empty() => {
                info!("TCP: peer closed the connection");
                self.drop_connection();
                Err(TransportError::Closed)
            }
            Ok(n) => Ok(n),
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(e) => {
                warn!("TCP: read error: {}", e);
                self.drop_connection();
                Err(TransportError::Io)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }
        if self.pending.len() + data.len() > MAX_PENDING {
            return Err(TransportError::BufferFull);
        }
        self.pending.extend_from_slice(data);
        self.drain()?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.drain()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            // Best effort: push out a trailing DISCONNECT.
            let _ = stream.write(&self.pending);
        }
        self.drop_connection();
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
