//! TLS transport adapter.
//!
//! Implements [`Transport`] as rustls over the same off-loop TCP
//! [`Connector`] the plain transport uses.  Selected with `mqtt.use_tls`.
//!
//! ## Connection model
//!
//! 1. `open()` starts the TCP connect and returns.
//! 2. `poll_open()` first waits for the socket, then drives the TLS
//!    handshake one non-blocking step per call.  The handshake shares the
//!    connect timeout.
//! 3. After the handshake, `read()`/`write()` move plaintext through the
//!    rustls session; ciphertext only moves when the socket is ready.
//!
//! Trust anchors come from `mqtt.ca_file` (PEM) when set, otherwise from
//! the platform's native store.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use tokio::runtime::Handle;

use super::tcp_transport::Connector;
use crate::error::TransportError;
use crate::mqtt::transport::Transport;

// ───────────────────────────────────────────────────────────────
// Trust anchors
// ───────────────────────────────────────────────────────────────

/// Roots from a PEM bundle, or the native store when `ca_file` is `None`.
pub fn root_store(ca_file: Option<&Path>) -> Result<RootCertStore, TransportError> {
    let certs: Vec<CertificateDer<'static>> = match ca_file {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                warn!("TLS: cannot open CA file {}: {}", path.display(), e);
                TransportError::Tls
            })?;
            rustls_pemfile::certs(&mut BufReader::new(file))
                .collect::<Result<_, _>>()
                .map_err(|e| {
                    warn!("TLS: bad PEM in {}: {}", path.display(), e);
                    TransportError::Tls
                })?
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for e in &native.errors {
                warn!("TLS: native root store: {}", e);
            }
            native.certs
        }
    };

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        debug!("TLS: ignored {} unparsable root certificates", ignored);
    }
    if roots.is_empty() {
        warn!("TLS: no usable root certificates");
        return Err(TransportError::Tls);
    }
    info!("TLS: {} trust anchors loaded", added);
    Ok(roots)
}

/// Client config with the ring provider and the given roots.
pub fn client_config(roots: RootCertStore) -> Result<Arc<ClientConfig>, TransportError> {
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| {
        warn!("TLS: {}", e);
        TransportError::Tls
    })?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(Arc::new(config))
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

struct Session {
    sock: TcpStream,
    tls: ClientConnection,
    started: Instant,
    /// The socket reported EOF.
    eof: bool,
}

impl Session {
    /// Push queued records until the socket would block.
    fn write_out(&mut self) -> Result<(), TransportError> {
        while self.tls.wants_write() {
            match self.tls.write_tls(&mut self.sock) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => {}
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("TLS: write error: {}", e);
                    return Err(TransportError::Io);
                }
            }
        }
        Ok(())
    }

    /// Pull whatever ciphertext is waiting and decrypt it.
    fn read_in(&mut self) -> Result<(), TransportError> {
        while !self.eof && self.tls.wants_read() {
            match self.tls.read_tls(&mut self.sock) {
                Ok(0) => self.eof = true,
                Ok(_) => {
                    self.tls.process_new_packets().map_err(|e| {
                        warn!("TLS: {}", e);
                        TransportError::Tls
                    })?;
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("TLS: read error: {}", e);
                    return Err(TransportError::Io);
                }
            }
        }
        Ok(())
    }

    /// One handshake step.  `Ok(true)` once application data can flow.
    fn handshake(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        self.write_out()?;
        self.read_in()?;
        self.write_out()?;
        if !self.tls.is_handshaking() {
            return Ok(true);
        }
        if self.eof {
            warn!("TLS: peer closed during handshake");
            return Err(TransportError::Closed);
        }
        if self.started.elapsed() > timeout {
            warn!("TLS: handshake timed out");
            return Err(TransportError::Tls);
        }
        Ok(false)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.read_in()?;
        match self.tls.reader().read(buf) {
            // close_notify received.
            Ok(0) if !buf.is_empty() => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                if self.eof {
                    Err(TransportError::Closed)
                } else {
                    Ok(0)
                }
            }
            Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => Err(TransportError::Closed),
            Err(e) => {
                warn!("TLS: read error: {}", e);
                Err(TransportError::Io)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let accepted = self
            .tls
            .writer()
            .write(data)
            .map_err(|_| TransportError::Io)?;
        if accepted != data.len() {
            return Err(TransportError::BufferFull);
        }
        self.write_out()?;
        Ok(accepted)
    }
}

// ───────────────────────────────────────────────────────────────
// TlsTransport
// ───────────────────────────────────────────────────────────────

pub struct TlsTransport {
    connector: Connector,
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    session: Option<Session>,
}

impl TlsTransport {
    /// Build with roots from `ca_file`, or the native store.
    pub fn new(
        runtime: Handle,
        host: &str,
        port: u16,
        connect_timeout_ms: u32,
        ca_file: Option<&Path>,
    ) -> Result<Self, TransportError> {
        let config = client_config(root_store(ca_file)?)?;
        Self::with_config(runtime, host, port, connect_timeout_ms, config)
    }

    pub fn with_config(
        runtime: Handle,
        host: &str,
        port: u16,
        connect_timeout_ms: u32,
        config: Arc<ClientConfig>,
    ) -> Result<Self, TransportError> {
        let server_name = ServerName::try_from(host.to_owned()).map_err(|e| {
            warn!("TLS: '{}' is not a valid server name: {}", host, e);
            TransportError::Tls
        })?;
        Ok(Self {
            connector: Connector::new(runtime, host, port, connect_timeout_ms),
            config,
            server_name,
            session: None,
        })
    }

    pub fn peer(&self) -> String {
        self.connector.peer()
    }

    fn established(&mut self) -> Option<&mut Session> {
        self.session.as_mut().filter(|s| !s.tls.is_handshaking())
    }

    fn drop_session(&mut self) {
        self.connector.cancel();
        if self.session.take().is_some() {
            info!("TLS: connection to {} closed", self.peer());
        }
    }

    /// Run `op` on the established session; any error tears it down.
    fn with_session<R>(
        &mut self,
        op: impl FnOnce(&mut Session) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let session = self.established().ok_or(TransportError::NotConnected)?;
        let outcome = op(session);
        if outcome.is_err() {
            self.drop_session();
        }
        outcome
    }
}

impl Transport for TlsTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.drop_session();
        self.connector.start();
        Ok(())
    }

    fn poll_open(&mut self) -> Result<bool, TransportError> {
        if self.session.is_none() {
            let Some(sock) = self.connector.poll()? else {
                return Ok(false);
            };
            let tls = ClientConnection::new(Arc::clone(&self.config), self.server_name.clone())
                .map_err(|e| {
                    warn!("TLS: {}", e);
                    TransportError::Tls
                })?;
            debug!("TLS: TCP up, handshaking with {}", self.peer());
            self.session = Some(Session {
                sock,
                tls,
                started: Instant::now(),
                eof: false,
            });
        }

        let timeout = self.connector.timeout();
        let peer = self.peer();
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let was_handshaking = session.tls.is_handshaking();
        match session.handshake(timeout) {
            Ok(true) => {
                if was_handshaking {
                    info!(
                        "TLS: session with {} established ({:?})",
                        peer,
                        session.tls.protocol_version()
                    );
                }
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                self.drop_session();
                Err(e)
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.with_session(|s| s.read(buf))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.with_session(|s| s.write(data))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.with_session(Session::write_out)
    }

    fn close(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.tls.send_close_notify();
            let _ = session.write_out();
        }
        self.drop_session();
    }

    fn is_open(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.tls.is_handshaking())
    }
}
