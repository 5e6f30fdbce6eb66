//! Mock connector and transport for testing
//!
//! A [`MockConnector`] is scripted per peer name. Each accepted open hands the
//! session manager a transport wired to a [`MockPeer`], which the test uses to
//! drive the other end of the stream.

use super::{Connector, Transport};
use crate::error::{Result, SetuError};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

enum Inbound {
    Data(Vec<u8>),
    Fail(ErrorKind),
}

enum Script {
    Accept { peer: MockPeer, delay: Duration },
    Refuse { delay: Duration },
}

#[derive(Default)]
struct OpenStats {
    opens: AtomicUsize,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
}

/// Scriptable connector; peers are plain strings
#[derive(Clone, Default)]
pub struct MockConnector {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Script>>>>,
    stats: Arc<OpenStats>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next open of `peer` immediately
    pub fn accept(&self, peer: &str) -> MockPeer {
        self.accept_after(peer, Duration::ZERO)
    }

    /// Accept the next open of `peer` after `delay`
    pub fn accept_after(&self, peer: &str, delay: Duration) -> MockPeer {
        let handle = MockPeer::new();
        self.push(
            peer,
            Script::Accept {
                peer: handle.clone(),
                delay,
            },
        );
        handle
    }

    /// Refuse the next open of `peer`
    pub fn refuse(&self, peer: &str) {
        self.refuse_after(peer, Duration::ZERO);
    }

    pub fn refuse_after(&self, peer: &str, delay: Duration) {
        self.push(peer, Script::Refuse { delay });
    }

    fn push(&self, peer: &str, script: Script) {
        self.scripts
            .lock()
            .entry(peer.to_string())
            .or_default()
            .push_back(script);
    }

    /// Total successful opens
    pub fn open_count(&self) -> usize {
        self.stats.opens.load(Ordering::SeqCst)
    }

    /// Transports opened and not yet closed
    pub fn currently_open(&self) -> usize {
        self.stats.open_now.load(Ordering::SeqCst)
    }

    /// Highest number of transports that were open at the same time
    pub fn max_concurrent_open(&self) -> usize {
        self.stats.max_open.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Peer = String;

    fn open(&self, peer: &String) -> Result<Box<dyn Transport>> {
        let script = self
            .scripts
            .lock()
            .get_mut(peer)
            .and_then(|queue| queue.pop_front());

        match script {
            Some(Script::Accept { peer: handle, delay }) => {
                thread::sleep(delay);
                let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
                self.stats.max_open.fetch_max(now, Ordering::SeqCst);
                self.stats.opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockTransport::new(handle, Arc::clone(&self.stats))))
            }
            Some(Script::Refuse { delay }) => {
                thread::sleep(delay);
                Err(IoError::new(ErrorKind::ConnectionRefused, format!("{} refused", peer)).into())
            }
            None => Err(IoError::new(ErrorKind::NotFound, format!("{} not scripted", peer)).into()),
        }
    }
}

struct PeerInner {
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    written: Mutex<Vec<u8>>,
    write_attempts: AtomicUsize,
    fail_writes: AtomicBool,
    fail_close: AtomicBool,
    close_calls: AtomicUsize,
}

/// Test-side handle of a scripted peer
#[derive(Clone)]
pub struct MockPeer {
    inner: Arc<PeerInner>,
}

impl MockPeer {
    fn new() -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        Self {
            inner: Arc::new(PeerInner {
                inbound_tx,
                inbound_rx,
                written: Mutex::new(Vec::new()),
                write_attempts: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
                close_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue bytes for the next transport read
    pub fn send(&self, data: &[u8]) {
        let _ = self.inner.inbound_tx.send(Inbound::Data(data.to_vec()));
    }

    /// Make the next transport read fail with `kind`
    pub fn fail_read(&self, kind: ErrorKind) {
        let _ = self.inner.inbound_tx.send(Inbound::Fail(kind));
    }

    /// Make every following write fail
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `close` report an error. The stream is still released.
    pub fn fail_close(&self, fail: bool) {
        self.inner.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Bytes successfully written so far
    pub fn written(&self) -> Vec<u8> {
        self.inner.written.lock().clone()
    }

    /// Written bytes split into lines (delimiters removed)
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Writes attempted, including failed ones
    pub fn write_attempts(&self) -> usize {
        self.inner.write_attempts.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls() > 0
    }
}

struct MockTransport {
    peer: MockPeer,
    stats: Arc<OpenStats>,
    /// Dropping the sender disconnects `close_rx`, waking a blocked read
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    /// Bytes from an inbound chunk that did not fit the caller's buffer
    leftover: Mutex<Vec<u8>>,
}

impl MockTransport {
    fn new(peer: MockPeer, stats: Arc<OpenStats>) -> Self {
        let (close_tx, close_rx) = unbounded();
        Self {
            peer,
            stats,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            leftover: Mutex::new(Vec::new()),
        }
    }

    fn is_closed(&self) -> bool {
        self.close_tx.lock().is_none()
    }

    fn fill(&self, buffer: &mut [u8], mut data: Vec<u8>) -> usize {
        let n = data.len().min(buffer.len());
        buffer[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
            *self.leftover.lock() = data.split_off(n);
        }
        n
    }
}

impl Transport for MockTransport {
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(SetuError::Closed);
        }

        let pending = std::mem::take(&mut *self.leftover.lock());
        if !pending.is_empty() {
            return Ok(self.fill(buffer, pending));
        }

        let inbound = &self.peer.inner.inbound_rx;
        let closing = &self.close_rx;
        select! {
            recv(inbound) -> msg => match msg {
                Ok(Inbound::Data(data)) => Ok(self.fill(buffer, data)),
                Ok(Inbound::Fail(kind)) => Err(IoError::new(kind, "injected read failure").into()),
                Err(_) => Err(SetuError::Closed),
            },
            recv(closing) -> _ => Err(SetuError::Closed),
        }
    }

    fn write_all(&self, data: &[u8]) -> Result<()> {
        let inner = &self.peer.inner;
        inner.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(SetuError::Closed);
        }
        if inner.fail_writes.load(Ordering::SeqCst) {
            return Err(IoError::new(ErrorKind::BrokenPipe, "injected write failure").into());
        }
        inner.written.lock().extend_from_slice(data);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let inner = &self.peer.inner;
        inner.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.close_tx.lock().take().is_some() {
            self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        if inner.fail_close.load(Ordering::SeqCst) {
            return Err(IoError::other("injected close failure").into());
        }
        Ok(())
    }
}
