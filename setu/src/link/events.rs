//! Link events and their fan-out to subscribers.
//!
//! Every subscriber owns an unbounded channel, so publishing never blocks.
//! Memory is still bounded for telemetry: each subscription counts the
//! telemetry events it has not read yet, and once that backlog reaches the
//! configured limit further telemetry for that subscriber is dropped (and
//! counted). Connection and command events are always delivered.

use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds since the UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Audit entry for a command that was written to the robot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    /// Wire token, without delimiter
    pub token: String,
    /// Completion time of the write (µs since UNIX epoch)
    pub issued_at_us: u64,
}

impl CommandRecord {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at_us: now_us(),
        }
    }
}

/// One inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    /// Line bytes without delimiter
    pub raw: Vec<u8>,
    pub received_at_us: u64,
}

impl TelemetryEvent {
    pub fn new(raw: Vec<u8>) -> Self {
        Self {
            raw,
            received_at_us: now_us(),
        }
    }

    /// Line as text; invalid UTF-8 is replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Notification published by the link manager
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Link came up (`true`) or is down (`false`). Repeated `false` is possible.
    Connected(bool),
    CommandSent(CommandRecord),
    Telemetry(TelemetryEvent),
}

struct Subscriber {
    tx: Sender<LinkEvent>,
    backlog: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
}

/// Publish/subscribe fan-out
pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
    max_backlog: usize,
}

impl EventHub {
    pub fn new(max_backlog: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            max_backlog,
        }
    }

    /// Register a new subscriber.
    ///
    /// Only telemetry is bounded per subscriber. `Connected` and `CommandSent`
    /// events queue without limit until read, so a subscription that is no
    /// longer read must be dropped; it is then pruned on the next publish.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded();
        let backlog = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        self.subscribers.lock().push(Subscriber {
            tx,
            backlog: Arc::clone(&backlog),
            dropped: Arc::clone(&dropped),
        });
        Subscription {
            rx,
            backlog,
            dropped,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `event` to every live subscriber; never blocks.
    pub fn publish(&self, event: LinkEvent) {
        let is_telemetry = matches!(event, LinkEvent::Telemetry(_));
        let max_backlog = self.max_backlog;

        self.subscribers.lock().retain(|sub| {
            if is_telemetry {
                if sub.backlog.load(Ordering::Acquire) >= max_backlog {
                    let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped.is_power_of_two() {
                        tracing::warn!("Slow subscriber: {} telemetry lines dropped", dropped);
                    }
                    return true;
                }
                sub.backlog.fetch_add(1, Ordering::AcqRel);
            }
            // A send error means the subscription was dropped
            sub.tx.send(event.clone()).is_ok()
        });
    }
}

/// Receiving end of a subscription
pub struct Subscription {
    rx: Receiver<LinkEvent>,
    backlog: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// Block until the next event; errors once the publisher is gone
    pub fn recv(&self) -> Result<LinkEvent, RecvError> {
        self.rx.recv().map(|e| self.consumed(e))
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<LinkEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout).map(|e| self.consumed(e))
    }

    pub fn try_recv(&self) -> Result<LinkEvent, TryRecvError> {
        self.rx.try_recv().map(|e| self.consumed(e))
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Telemetry events dropped because this subscriber fell behind
    pub fn dropped_telemetry(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn consumed(&self, event: LinkEvent) -> LinkEvent {
        if matches!(event, LinkEvent::Telemetry(_)) {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
        }
        event
    }
}
