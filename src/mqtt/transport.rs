//! Transport abstraction: the byte stream under the MQTT client.
//!
//! Concrete implementations:
//! - [`TcpTransport`](crate::adapters::tcp_transport::TcpTransport), plain TCP on the host
//! - [`TlsTransport`](crate::adapters::tls_transport::TlsTransport), rustls over the same connector
//! - scripted mock transports in the integration tests
//!
//! Opening is two-phase.  [`open`](Transport::open) only starts the
//! attempt; the event loop then calls [`poll_open`](Transport::poll_open)
//! every tick until the link is usable or the attempt fails.  Nothing in
//! this trait may block the loop.

use crate::error::TransportError;

/// Byte-oriented, non-blocking client connection.
pub trait Transport {
    /// Start connecting.  Returns immediately.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Progress a pending open.  `Ok(true)` once the link can carry bytes,
    /// `Ok(false)` while still connecting.
    fn poll_open(&mut self) -> Result<bool, TransportError> {
        Ok(self.is_open())
    }

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data is available (non-blocking).
    /// Returns [`TransportError::Closed`] once the peer has hung up.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Queue `data` for sending.  Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Push queued output to the socket without blocking.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Tear down the connection.  Always safe to call.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Lets the binary pick TCP or TLS at runtime behind one client type.
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }
    fn poll_open(&mut self) -> Result<bool, TransportError> {
        (**self).poll_open()
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(data)
    }
    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }
    fn close(&mut self) {
        (**self).close();
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}
