//! TCP transport for robots reachable through a network serial bridge.
//!
//! Wi-Fi UART bridges (ESP-Link and similar) and the desktop simulators expose
//! the robot's line protocol on a plain TCP port, so the stream is used as-is.

use super::Transport;
use crate::error::{Result, SetuError};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP stream transport
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connect with timeout, trying every address `addr` resolves to
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| SetuError::InvalidPeer(format!("{}: {}", addr, e)))?
            .collect();

        let mut last_err = None;
        for sock_addr in addrs {
            match TcpStream::connect_timeout(&sock_addr, timeout) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", sock_addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => SetuError::Io(e),
            None => SetuError::InvalidPeer(format!("{} resolved to no addresses", addr)),
        })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        // Commands are tiny; don't let Nagle hold them back
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        tracing::info!("TCP transport connected to {}", peer);
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        match (&self.stream).read(buffer) {
            Ok(0) => Err(SetuError::Closed),
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut stream = &self.stream;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // Shutdown wakes a reader blocked in recv() with EOF
        self.stream.shutdown(Shutdown::Both)?;
        tracing::debug!("TCP transport to {} shut down", self.peer);
        Ok(())
    }
}
