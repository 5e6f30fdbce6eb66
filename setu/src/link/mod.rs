//! Link session manager.
//!
//! Owns the single connection to the robot and everything that happens on it:
//!
//! - **Lifecycle**: `connect` / `disconnect` / I/O failure drive the session
//!   through `Idle → Connecting → Connected → Disconnecting → Idle`
//! - **Drain loop**: one `link-drain` thread per connected session turns the
//!   inbound byte stream into telemetry lines
//! - **Command path**: `send` writes one token per line, serialized across callers
//! - **Events**: every transition, command and line is published to subscribers
//!
//! # Locking
//!
//! A single session mutex guards the state, the transport handle and the
//! session epoch, and every event is published while holding it, so
//! subscribers observe events in the order the transitions happened. The
//! mutex is never held across a blocking open or read: opening runs on a
//! `link-open` thread and reports back under the lock, tagged with the epoch
//! it was started for. Any transition bumps the epoch, which is how stale
//! open results and drain loops of torn-down sessions are recognized and
//! silenced.
//!
//! A new open attempt first joins every earlier worker thread of this manager,
//! so two transports are never open at the same time.

mod drain;
mod events;
mod framer;

pub use events::{CommandRecord, EventHub, LinkEvent, Subscription, TelemetryEvent, now_us};
pub use framer::{DELIMITER, LineFramer};

use crate::command::Command;
use crate::config::LinkConfig;
use crate::error::{Result, SetuError};
use crate::transport::{Connector, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Connected,
    /// Transient while the transport is being released
    Disconnecting,
}

/// Session manager tuning
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub read_chunk_size: usize,
    pub max_line_len: usize,
    pub subscriber_backlog: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings::from(&LinkConfig::default())
    }
}

impl From<&LinkConfig> for LinkSettings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            read_chunk_size: config.read_chunk_size.max(1),
            max_line_len: config.max_line_len.max(1),
            subscriber_backlog: config.subscriber_backlog,
        }
    }
}

struct Session {
    state: LinkState,
    /// Identifies the current attempt; bumped by every teardown
    epoch: u64,
    /// Present only while `Connected`
    transport: Option<Arc<dyn Transport>>,
    /// Opener and drain threads not yet joined
    workers: Vec<JoinHandle<()>>,
}

/// State shared between the manager and its worker threads
struct Shared {
    session: Mutex<Session>,
    /// Serializes writes so command records are published in write order
    send_gate: Mutex<()>,
    hub: EventHub,
    settings: LinkSettings,
}

impl Shared {
    /// Drive the session to `Idle`, releasing the transport. Returns the previous state.
    fn teardown(&self, session: &mut Session) -> LinkState {
        let previous = session.state;
        session.epoch += 1;
        if previous == LinkState::Idle {
            return previous;
        }

        session.state = LinkState::Disconnecting;
        if let Some(transport) = session.transport.take()
            && let Err(e) = transport.close()
        {
            // Nothing useful can be done about a failed close
            tracing::debug!("Ignoring transport close error: {}", e);
        }
        session.state = LinkState::Idle;
        previous
    }

    fn is_current(&self, epoch: u64) -> bool {
        let session = self.session.lock();
        session.epoch == epoch && session.state == LinkState::Connected
    }

    fn is_pending_open(&self, epoch: u64) -> bool {
        let session = self.session.lock();
        session.epoch == epoch && session.state == LinkState::Connecting
    }

    /// Publish one inbound line; `false` once the session is gone.
    fn publish_telemetry(&self, epoch: u64, raw: Vec<u8>) -> bool {
        let session = self.session.lock();
        if session.epoch != epoch || session.state != LinkState::Connected {
            return false;
        }
        tracing::trace!("Telemetry: {}", String::from_utf8_lossy(&raw));
        self.hub.publish(LinkEvent::Telemetry(TelemetryEvent::new(raw)));
        true
    }

    fn record_command(&self, epoch: u64, token: &str) -> bool {
        let session = self.session.lock();
        if session.epoch != epoch || session.state != LinkState::Connected {
            tracing::debug!("Session ended while sending {}", token);
            return false;
        }
        tracing::debug!("Sent command: {}", token);
        self.hub
            .publish(LinkEvent::CommandSent(CommandRecord::new(token)));
        true
    }

    /// I/O failure on the session started as `epoch`
    fn fail(&self, epoch: u64, error: &SetuError) {
        let mut session = self.session.lock();
        if session.epoch != epoch || session.state != LinkState::Connected {
            tracing::debug!("Ignoring error from finished session: {}", error);
            return;
        }
        match error {
            SetuError::Closed => tracing::info!("Link closed by peer"),
            _ => tracing::warn!("Link lost: {}", error),
        }
        self.teardown(&mut session);
        self.hub.publish(LinkEvent::Connected(false));
    }

    /// Report the outcome of an open started as `epoch`
    fn finish_open(self: &Arc<Self>, epoch: u64, peer: &str, result: Result<Box<dyn Transport>>) {
        let mut session = self.session.lock();

        if session.epoch != epoch || session.state != LinkState::Connecting {
            if let Ok(transport) = result {
                tracing::debug!("Discarding superseded connection to {}", peer);
                if let Err(e) = transport.close() {
                    tracing::debug!("Ignoring transport close error: {}", e);
                }
            }
            return;
        }

        let transport: Arc<dyn Transport> = match result {
            Ok(transport) => Arc::from(transport),
            Err(e) => {
                tracing::warn!("Failed to connect to {}: {}", peer, e);
                session.state = LinkState::Idle;
                self.hub.publish(LinkEvent::Connected(false));
                return;
            }
        };

        match drain::spawn(Arc::clone(self), Arc::clone(&transport), epoch) {
            Ok(handle) => {
                session.workers.push(handle);
                session.transport = Some(transport);
                session.state = LinkState::Connected;
                tracing::info!("Connected to {}", peer);
                self.hub.publish(LinkEvent::Connected(true));
            }
            Err(e) => {
                tracing::error!("Failed to spawn drain thread: {}", e);
                if let Err(e) = transport.close() {
                    tracing::debug!("Ignoring transport close error: {}", e);
                }
                session.state = LinkState::Idle;
                self.hub.publish(LinkEvent::Connected(false));
            }
        }
    }
}

/// Manages the link to one robot at a time
pub struct LinkManager<C: Connector> {
    shared: Arc<Shared>,
    connector: Arc<C>,
}

impl<C: Connector> LinkManager<C> {
    pub fn new(connector: C, settings: LinkSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    state: LinkState::Idle,
                    epoch: 0,
                    transport: None,
                    workers: Vec::new(),
                }),
                send_gate: Mutex::new(()),
                hub: EventHub::new(settings.subscriber_backlog),
                settings,
            }),
            connector: Arc::new(connector),
        }
    }

    /// Subscribe to link events from now on.
    ///
    /// Drop the subscription when done with it: only telemetry is bounded per
    /// subscriber (see [`EventHub::subscribe`]).
    pub fn subscribe(&self) -> Subscription {
        self.shared.hub.subscribe()
    }

    pub fn state(&self) -> LinkState {
        self.shared.session.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Start connecting to `peer`, replacing any current session.
    ///
    /// Returns immediately; the outcome arrives as `Connected(true|false)`.
    /// If another `connect` or `disconnect` comes first, this attempt is
    /// dropped without an event. Replacing a connected session publishes
    /// `Connected(false)` for it.
    pub fn connect(&self, peer: C::Peer) {
        let shared = &self.shared;
        let mut session = shared.session.lock();

        if shared.teardown(&mut session) == LinkState::Connected {
            shared.hub.publish(LinkEvent::Connected(false));
        }
        let epoch = session.epoch;
        session.state = LinkState::Connecting;
        let previous = std::mem::take(&mut session.workers);
        tracing::info!("Connecting to {}...", peer);

        let opener = Arc::clone(shared);
        let connector = Arc::clone(&self.connector);
        let spawned = thread::Builder::new()
            .name("link-open".into())
            .spawn(move || {
                for worker in previous {
                    if worker.join().is_err() {
                        tracing::error!("Link worker thread panicked");
                    }
                }
                if !opener.is_pending_open(epoch) {
                    tracing::debug!("Connection to {} superseded before opening", peer);
                    return;
                }
                let result = connector.open(&peer);
                opener.finish_open(epoch, &peer.to_string(), result);
            });

        match spawned {
            Ok(handle) => session.workers.push(handle),
            Err(e) => {
                tracing::error!("Failed to spawn connect thread: {}", e);
                session.state = LinkState::Idle;
                shared.hub.publish(LinkEvent::Connected(false));
            }
        }
    }

    /// Tear down the current session.
    ///
    /// The state is `Idle` when this returns. Always publishes exactly one
    /// `Connected(false)`, even when already idle.
    pub fn disconnect(&self) {
        let mut session = self.shared.session.lock();
        let previous = self.shared.teardown(&mut session);
        if previous != LinkState::Idle {
            tracing::info!("Disconnected ({:?} -> Idle)", previous);
        }
        self.shared.hub.publish(LinkEvent::Connected(false));
    }

    /// Send a typed command
    pub fn send(&self, command: &Command) -> bool {
        self.send_token(&command.token())
    }

    /// Write `token` plus the line delimiter.
    ///
    /// Returns `true` only if the link was connected and the write completed.
    /// A write error tears the session down. There is no retry.
    pub fn send_token(&self, token: &str) -> bool {
        if token.is_empty() || token.contains(['\n', '\r']) {
            tracing::warn!("Refusing malformed command token {:?}", token);
            return false;
        }

        let _gate = self.shared.send_gate.lock();
        let (epoch, transport) = {
            let session = self.shared.session.lock();
            match (&session.transport, session.state) {
                (Some(transport), LinkState::Connected) => (session.epoch, Arc::clone(transport)),
                _ => {
                    tracing::debug!("Not connected, dropping command {}", token);
                    return false;
                }
            }
        };

        let mut frame = Vec::with_capacity(token.len() + 1);
        frame.extend_from_slice(token.as_bytes());
        frame.push(DELIMITER);

        match transport.write_all(&frame) {
            Ok(()) => self.shared.record_command(epoch, token),
            Err(e) => {
                self.shared.fail(epoch, &e);
                false
            }
        }
    }
}

impl<C: Connector> Drop for LinkManager<C> {
    fn drop(&mut self) {
        let workers = {
            let mut session = self.shared.session.lock();
            if self.shared.teardown(&mut session) == LinkState::Connected {
                self.shared.hub.publish(LinkEvent::Connected(false));
            }
            std::mem::take(&mut session.workers)
        };
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Link worker thread panicked");
            }
        }
    }
}
