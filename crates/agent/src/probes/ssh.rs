use ssh2::Session;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tokio::net::lookup_host;
use tracing::debug;

use netcheck_common::{ProbeError, Protocol};

/// Opens a TCP connection and completes the SSH protocol handshake.
///
/// No authentication is attempted: a server that got as far as key exchange
/// is reachable.
pub async fn probe(address: &str, timeout: Duration) -> Result<(), ProbeError> {
    let dial_error = |reason: String| ProbeError::Dial {
        address: address.to_string(),
        protocol: Protocol::Ssh.to_string(),
        reason,
    };

    let targets: Vec<SocketAddr> = match tokio::time::timeout(timeout, lookup_host(address)).await {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(e)) => return Err(dial_error(e.to_string())),
        Err(_) => return Err(dial_error(format!("resolution timed out after {timeout:?}"))),
    };
    if targets.is_empty() {
        return Err(dial_error("no addresses found for host".to_string()));
    }

    let owned_address = address.to_string();
    tokio::task::spawn_blocking(move || handshake(&owned_address, &targets, timeout))
        .await
        .map_err(|e| ProbeError::Aborted(format!("SSH probe task failed: {e}")))?
}

/// Connects to the first resolved address that accepts, reporting the last
/// failure when none does.
fn connect_any(targets: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no addresses to connect to");
    for target in targets {
        match TcpStream::connect_timeout(target, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%target, error = %e, "SSH connect attempt failed.");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

fn handshake(address: &str, targets: &[SocketAddr], timeout: Duration) -> Result<(), ProbeError> {
    let tcp = connect_any(targets, timeout).map_err(|e| ProbeError::Dial {
        address: address.to_string(),
        protocol: Protocol::Ssh.to_string(),
        reason: e.to_string(),
    })?;

    let handshake_error = |reason: String| ProbeError::Handshake {
        address: address.to_string(),
        reason,
    };
    let mut session = Session::new().map_err(|e| handshake_error(e.to_string()))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| handshake_error(e.to_string()))?;

    debug!(address, banner = ?session.banner(), "SSH handshake completed.");
    let _ = session.disconnect(None, "reachability check complete", None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn closed_port_is_a_dial_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let error = probe(&address, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(error.kind(), "dial");
    }

    #[test]
    fn later_address_is_tried_when_the_first_refuses() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);
        let open = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let open_addr = open.local_addr().unwrap();

        let stream = connect_any(&[closed_addr, open_addr], Duration::from_secs(2)).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), open_addr);
        assert!(connect_any(&[closed_addr], Duration::from_secs(2)).is_err());
    }

    #[tokio::test]
    async fn non_ssh_server_fails_the_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });

        let error = probe(&address, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(error.kind(), "handshake");
    }
}
