//! Plain transport probes: a TCP connect or a connected UDP socket.
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::debug;

use netcheck_common::{ProbeError, Protocol};

fn dial_error(address: &str, protocol: Protocol, reason: impl ToString) -> ProbeError {
    ProbeError::Dial {
        address: address.to_string(),
        protocol: protocol.to_string(),
        reason: reason.to_string(),
    }
}

/// Opens a TCP connection within `timeout`.
pub(crate) async fn connect_stream(
    address: &str,
    protocol: Protocol,
    timeout: Duration,
) -> Result<TcpStream, ProbeError> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(dial_error(address, protocol, e)),
        Err(_) => Err(dial_error(
            address,
            protocol,
            format!("connection timed out after {timeout:?}"),
        )),
    }
}

async fn bind_and_connect(address: &str) -> io::Result<UdpSocket> {
    let mut last_error = None;
    for target in lookup_host(address).await? {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let attempt = async {
            let socket = UdpSocket::bind(local).await?;
            socket.connect(target).await?;
            Ok::<_, io::Error>(socket)
        };
        match attempt.await {
            Ok(socket) => return Ok(socket),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no addresses found for host")
    }))
}

/// Binds an ephemeral UDP socket and connects it to `address` within
/// `timeout`. No datagram is sent.
pub(crate) async fn connect_datagram(
    address: &str,
    protocol: Protocol,
    timeout: Duration,
) -> Result<UdpSocket, ProbeError> {
    match tokio::time::timeout(timeout, bind_and_connect(address)).await {
        Ok(Ok(socket)) => Ok(socket),
        Ok(Err(e)) => Err(dial_error(address, protocol, e)),
        Err(_) => Err(dial_error(
            address,
            protocol,
            format!("connection timed out after {timeout:?}"),
        )),
    }
}

pub async fn probe_stream(address: &str, timeout: Duration) -> Result<(), ProbeError> {
    let stream = connect_stream(address, Protocol::Tcp, timeout).await?;
    debug!(address, peer = ?stream.peer_addr().ok(), "TCP connection established.");
    drop(stream);
    Ok(())
}

pub async fn probe_datagram(address: &str, timeout: Duration) -> Result<(), ProbeError> {
    let socket = connect_datagram(address, Protocol::Udp, timeout).await?;
    debug!(address, peer = ?socket.peer_addr().ok(), "UDP socket connected.");
    drop(socket);
    Ok(())
}
