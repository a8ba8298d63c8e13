//! Fake device endpoint for testing purposes.
//!
//! Accepts TCP connections on an ephemeral loopback port and keeps them open
//! until the peer hangs up, recording how many were made.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// A fake device accepting connections on loopback.
#[derive(Debug)]
pub struct FakeDevice {
    address: SocketAddr,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl FakeDevice {
    /// Starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        let device = Self {
            address,
            accepted: Arc::clone(&accepted),
            closed: Arc::clone(&closed),
            shutdown: shutdown.clone(),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                accepted.fetch_add(1, Ordering::SeqCst);
                                let closed = Arc::clone(&closed);
                                let shutdown = shutdown.clone();
                                tokio::spawn(async move {
                                    Self::hold(stream, shutdown).await;
                                    closed.fetch_add(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                    () = shutdown.cancelled() => {
                        break;
                    }
                }
            }
        });

        Ok(device)
    }

    /// Returns the address the device is listening on.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the listening port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Number of connections that have ended.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until `count` connections were accepted, up to one second.
    pub async fn wait_accepted(&self, count: usize) -> bool {
        Self::wait_for(|| self.accepted() >= count).await
    }

    /// Waits until `count` connections have ended, up to one second.
    pub async fn wait_closed(&self, count: usize) -> bool {
        Self::wait_for(|| self.closed() >= count).await
    }

    async fn wait_for(condition: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    /// Stops accepting and drops open connections.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Reads and discards until the client hangs up.
    async fn hold(mut stream: TcpStream, shutdown: CancellationToken) {
        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                read = stream.read(&mut buf) => {
                    if matches!(read, Ok(0) | Err(_)) {
                        break;
                    }
                }
                () = shutdown.cancelled() => break,
            }
        }
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
