//! Transport connection to a device endpoint

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use super::secure::{HapFrameCodec, SessionKeys};
use crate::error::AirPlayError;

const READ_CHUNK: usize = 4096;

/// A live TCP connection to one device endpoint
///
/// Plain until [`enable_encryption`](Self::enable_encryption) installs HAP
/// session keys, after which every send is sealed and every receive opened.
pub struct HttpConnection {
    peer: SocketAddr,
    stream: Option<TcpStream>,
    codec: Option<HapFrameCodec>,
    read_buf: BytesMut,
    verified: bool,
}

impl HttpConnection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            peer,
            stream: Some(stream),
            codec: None,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            verified: false,
        }
    }

    /// Remote address
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether [`close`](Self::close) has run
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Whether HAP encryption is active
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.codec.is_some()
    }

    /// Whether the connection passed credential verification
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub(crate) fn mark_verified(&mut self) {
        self.verified = true;
    }

    /// Switch the connection to HAP framing
    pub fn enable_encryption(&mut self, keys: &SessionKeys) {
        tracing::debug!("Enabling HAP encryption towards {}", self.peer);
        self.codec = Some(HapFrameCodec::new(keys));
    }

    /// Send raw application data
    ///
    /// # Errors
    ///
    /// Returns error if the connection is closed or the write fails
    pub async fn send(&mut self, data: Bytes) -> Result<(), AirPlayError> {
        let payload = match self.codec.as_mut() {
            Some(codec) => {
                let mut sealed = BytesMut::new();
                codec.encode(data, &mut sealed)?;
                sealed.freeze()
            }
            None => data,
        };

        let peer = self.peer;
        let stream = self.stream.as_mut().ok_or(AirPlayError::Disconnected {
            address: peer.to_string(),
        })?;
        stream.write_all(&payload).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Receive the next chunk of application data
    ///
    /// Returns `Ok(None)` when the device closed the connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure, on a truncated encrypted block or when a
    /// block fails authentication
    pub async fn receive(&mut self) -> Result<Option<Bytes>, AirPlayError> {
        loop {
            if let Some(codec) = self.codec.as_mut() {
                if let Some(frame) = codec.decode(&mut self.read_buf)? {
                    return Ok(Some(frame));
                }
            } else if !self.read_buf.is_empty() {
                return Ok(Some(self.read_buf.split().freeze()));
            }

            let peer = self.peer;
            let stream = self.stream.as_mut().ok_or(AirPlayError::Disconnected {
                address: peer.to_string(),
            })?;

            self.read_buf.reserve(READ_CHUNK);
            if stream.read_buf(&mut self.read_buf).await? == 0 {
                return if self.read_buf.is_empty() {
                    Ok(None)
                } else {
                    Err(AirPlayError::Disconnected {
                        address: peer.to_string(),
                    })
                };
            }
        }
    }

    /// Close the connection
    ///
    /// Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Closing connection to {}", self.peer);
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Shutdown of {} failed: {}", self.peer, e);
            }
        }
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .field("encrypted", &self.is_encrypted())
            .field("verified", &self.verified)
            .finish()
    }
}

/// Open a TCP connection to a device endpoint
///
/// # Errors
///
/// Returns `ConnectionTimeout` if the connect does not finish in `timeout`
/// and `ConnectionFailed` if it is refused or unreachable
pub async fn http_connect(
    address: IpAddr,
    port: u16,
    timeout: Duration,
) -> Result<HttpConnection, AirPlayError> {
    let peer = SocketAddr::new(address, port);
    tracing::debug!("Connecting to {}", peer);

    let stream = tokio::time::timeout(timeout, TcpStream::connect(peer))
        .await
        .map_err(|_| AirPlayError::ConnectionTimeout { duration: timeout })?
        .map_err(|e| AirPlayError::ConnectionFailed {
            address: peer.to_string(),
            message: e.to_string(),
            source: Some(Box::new(e)),
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY on {}: {}", peer, e);
    }

    Ok(HttpConnection::new(stream, peer))
}
