//! Setu - console client for line-protocol robots
//!
//! ## Usage
//!
//! ```text
//! setu ports                          # list serial devices (Bluetooth SPP, USB-UART)
//! setu console serial:///dev/rfcomm0  # drive a robot from stdin
//! setu -c robot.toml console          # peer taken from [connection] peer
//! ```
//!
//! Configuration is read from `--config`, else `setu.toml` in the working
//! directory, else built-in defaults.

mod console;

use clap::{Parser, Subcommand};
use setu::{Result, SetuConfig};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "setu", version, about = "Link client for line-protocol robots")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// List serial ports that can carry a robot link
    Ports,
    /// Connect to a robot and send commands typed on stdin
    Console {
        /// Peer address: tcp://host:port, host:port, serial://<path> or a device path
        peer: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Setu v{}", env!("CARGO_PKG_VERSION"));

    match cli.mode {
        Mode::Ports => list_ports(),
        Mode::Console { peer } => console::run(config, peer),
    }
}

fn load_config(path: Option<&Path>) -> Result<SetuConfig> {
    if let Some(path) = path {
        return SetuConfig::load(path);
    }
    let local = Path::new("setu.toml");
    if local.exists() {
        SetuConfig::load(local)
    } else {
        Ok(SetuConfig::default())
    }
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        let kind = match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => format!(
                "USB {:04x}:{:04x} {}",
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            serialport::SerialPortType::PciPort => "PCI".to_string(),
            serialport::SerialPortType::Unknown => "unknown".to_string(),
        };
        println!("{:<24} {}", port.port_name, kind);
    }
    Ok(())
}
