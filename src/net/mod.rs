//! Network layer
//!
//! Device connections, HAP encryption and local address selection.

mod connection;
mod gateway;
pub mod secure;


pub use connection::{HttpConnection, http_connect};
pub use gateway::{ConnectionGateway, CredentialVerifier};
pub use secure::{HapFrameCodec, SessionKeys};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

/// Local address the OS would use to reach `remote`
///
/// Connecting a UDP socket sends nothing; it only resolves the route.
///
/// # Errors
///
/// Returns error if no route to `remote` exists
pub async fn local_address_reaching(remote: IpAddr) -> std::io::Result<IpAddr> {
    let unspecified = match remote {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };

    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
    socket.connect(SocketAddr::new(remote, 9)).await?;
    Ok(socket.local_addr()?.ip())
}
