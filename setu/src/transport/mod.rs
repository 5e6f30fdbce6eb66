//! Transport layer: byte streams to the robot and the connectors that open them.

use crate::config::ConnectionConfig;
use crate::error::{Result, SetuError};
use std::fmt;
use std::str::FromStr;

mod mock;
mod serial;
mod tcp;

pub use mock::{MockConnector, MockPeer};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Bidirectional byte stream to a peer.
///
/// Methods take `&self` so that one thread can block in [`read`](Transport::read)
/// while another writes or closes the same stream.
pub trait Transport: Send + Sync {
    /// Read data into buffer, returns number of bytes read.
    ///
    /// `Ok(0)` means no data arrived within the transport's poll window; end of
    /// stream is reported as [`SetuError::Closed`].
    fn read(&self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer and flush it
    fn write_all(&self, data: &[u8]) -> Result<()>;

    /// Release the stream.
    ///
    /// Must not block, and must make a concurrent or later `read` return
    /// [`SetuError::Closed`] promptly.
    fn close(&self) -> Result<()>;
}

/// Opens transports to peers (the device-discovery side of the system).
pub trait Connector: Send + Sync + 'static {
    /// Opaque peer handle resolved by discovery/pairing
    type Peer: fmt::Display + Send + 'static;

    /// Open a transport to `peer`. May block until the peer answers or a timeout expires.
    fn open(&self, peer: &Self::Peer) -> Result<Box<dyn Transport>>;
}

/// Peer address understood by [`StreamConnector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    /// `host:port` of a TCP serial bridge or simulator
    Tcp(String),
    /// Serial device path, e.g. `/dev/rfcomm0` for a bound Bluetooth SPP channel
    Serial(String),
}

impl FromStr for PeerAddr {
    type Err = SetuError;

    /// Accepts `tcp://host:port`, `serial://<path>`, `host:port`, or a bare device path.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(addr) = s.strip_prefix("tcp://") {
            return tcp_addr(addr);
        }
        if let Some(path) = s.strip_prefix("serial://") {
            if path.is_empty() {
                return Err(SetuError::InvalidPeer(s.to_string()));
            }
            return Ok(PeerAddr::Serial(path.to_string()));
        }
        if s.starts_with('/') || is_com_port(s) {
            return Ok(PeerAddr::Serial(s.to_string()));
        }
        tcp_addr(s)
    }
}

fn is_com_port(s: &str) -> bool {
    match (s.get(..3), s.get(3..)) {
        (Some(prefix), Some(number)) => {
            prefix.eq_ignore_ascii_case("COM")
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn tcp_addr(addr: &str) -> Result<PeerAddr> {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(PeerAddr::Tcp(addr.to_string()))
        }
        _ => Err(SetuError::InvalidPeer(addr.to_string())),
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
            PeerAddr::Serial(path) => write!(f, "serial://{}", path),
        }
    }
}

/// Connector for TCP and serial peers
pub struct StreamConnector {
    config: ConnectionConfig,
}

impl StreamConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

impl Connector for StreamConnector {
    type Peer = PeerAddr;

    fn open(&self, peer: &PeerAddr) -> Result<Box<dyn Transport>> {
        match peer {
            PeerAddr::Tcp(addr) => Ok(Box::new(TcpTransport::connect_timeout(
                addr,
                self.config.connect_timeout(),
            )?)),
            PeerAddr::Serial(path) => Ok(Box::new(SerialTransport::open(
                path,
                self.config.baud_rate,
                self.config.read_poll(),
            )?)),
        }
    }
}
