//! A connected UDP socket exposed as a byte stream so the TLS client can
//! drive its handshake over datagrams. Nothing here speaks the DTLS record
//! layer.
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

/// Each write becomes one datagram and each read drains one datagram.
#[derive(Debug)]
pub struct DatagramStream {
    socket: UdpSocket,
}

impl DatagramStream {
    /// Wraps a socket that has already been `connect`ed to its peer.
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub fn get_ref(&self) -> &UdpSocket {
        &self.socket
    }
}

impl AsyncRead for DatagramStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.socket.poll_recv(cx, buf)
    }
}

impl AsyncWrite for DatagramStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn writes_and_reads_whole_datagrams() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        local.connect(peer.local_addr().unwrap()).await.unwrap();
        peer.connect(local.local_addr().unwrap()).await.unwrap();

        let mut stream = DatagramStream::new(local);
        stream.write_all(b"hello").await.unwrap();

        let mut received = [0u8; 16];
        let n = peer.recv(&mut received).await.unwrap();
        assert_eq!(&received[..n], b"hello");

        peer.send(b"world").await.unwrap();
        let mut reply = [0u8; 16];
        let n = stream.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"world");
    }
}
