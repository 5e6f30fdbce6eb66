//! Setu - Link client for line-protocol robot controllers
//!
//! Keeps a single stream connection to a robot (Bluetooth SPP, USB serial or a
//! TCP serial bridge), sends it text commands and turns its status stream into
//! events.
//!
//! ## Components
//!
//! - [`link::LinkManager`]: session lifecycle, drain thread, command path
//! - [`transport`]: byte-stream transports and the connectors that open them
//! - [`command`]: typed commands and their wire tokens
//! - [`projection`]: connection flag, robot state and command history for display
//! - [`telemetry`]: status line parsing

pub mod command;
pub mod config;
pub mod error;
pub mod link;
pub mod projection;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types
pub use command::{Command, Direction};
pub use config::SetuConfig;
pub use error::{Result, SetuError};
pub use link::{CommandRecord, LinkEvent, LinkManager, LinkSettings, LinkState, Subscription};
pub use projection::StateProjection;
pub use transport::{Connector, PeerAddr, StreamConnector, Transport};
