//! Serial transport implementation
//!
//! Covers USB-UART adapters and Bluetooth SPP links, which the OS exposes as
//! serial devices once bound (e.g. `rfcomm bind 0 <addr>` creates `/dev/rfcomm0`).

use super::Transport;
use crate::error::{Result, SetuError};
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Serial transport for UART and Bluetooth SPP communication
///
/// Reads and writes use separate handles to the same port so a reader blocked
/// for up to the read timeout never holds up a command write.
pub struct SerialTransport {
    reader: Mutex<Box<dyn SerialPort>>,
    writer: Mutex<Box<dyn SerialPort>>,
    closed: AtomicBool,
    path: String,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/rfcomm0")
    /// * `baud_rate` - Baud rate (e.g., 9600)
    /// * `read_poll` - Read timeout; a closed transport is noticed within this window
    pub fn open(path: &str, baud_rate: u32, read_poll: Duration) -> Result<Self> {
        let reader = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_poll)
            .open()?;
        let writer = reader.try_clone()?;

        tracing::info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialTransport {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            path: path.to_string(),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SetuError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Transport for SerialTransport {
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let result = self.reader.lock().read(buffer);
        // A close that raced the read wins over whatever the port returned
        self.ensure_open()?;
        match result {
            Ok(0) => Err(SetuError::Closed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut port = self.writer.lock();
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // The port handles are released when the last owner drops the transport
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Serial transport {} closed", self.path);
        }
        Ok(())
    }
}
