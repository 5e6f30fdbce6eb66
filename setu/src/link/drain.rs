//! Drain thread for a connected session
//!
//! Reads the transport continuously and publishes every complete line as
//! telemetry. The loop never blocks on subscribers (publishing is
//! non-blocking), so a stalled consumer cannot starve the reader.
//!
//! # Exit conditions
//!
//! - The session is no longer current (checked between reads). A read that
//!   is already blocked is woken by the teardown closing the transport.
//! - A read error or end of stream, which is reported back as a link failure.

use super::Shared;
use super::framer::LineFramer;
use crate::transport::Transport;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(super) fn spawn(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    epoch: u64,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("link-drain".into())
        .spawn(move || drain_loop(&shared, transport.as_ref(), epoch))
}

fn drain_loop(shared: &Shared, transport: &dyn Transport, epoch: u64) {
    let mut buffer = vec![0u8; shared.settings.read_chunk_size];
    let mut framer = LineFramer::new(shared.settings.max_line_len);

    tracing::debug!("Drain thread started (session {})", epoch);

    'session: while shared.is_current(epoch) {
        match transport.read(&mut buffer) {
            Ok(0) => {
                // Poll window elapsed without data
            }
            Ok(n) => {
                for line in framer.push(&buffer[..n]) {
                    if !shared.publish_telemetry(epoch, line) {
                        break 'session;
                    }
                }
            }
            Err(e) => {
                shared.fail(epoch, &e);
                break;
            }
        }
    }

    if framer.oversized_lines() > 0 {
        tracing::info!(
            "Session {} dropped {} over-long lines",
            epoch,
            framer.oversized_lines()
        );
    }
    tracing::debug!("Drain thread exiting (session {})", epoch);
}
