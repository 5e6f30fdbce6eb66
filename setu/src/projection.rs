//! Display-side view of the link.
//!
//! Holds what a control UI shows: whether the robot is connected, its last
//! reported state, and the most recent commands (newest first). It is fed
//! from a link [`Subscription`] and can be read from any thread.

use crate::error::Result;
use crate::link::{CommandRecord, LinkEvent, Subscription};
use crate::telemetry::{RobotState, parse_line};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Bounded command history, newest first
#[derive(Debug, Clone)]
pub struct CommandLog {
    records: VecDeque<CommandRecord>,
    capacity: usize,
}

impl CommandLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a record at the front, evicting the oldest beyond capacity
    pub fn push(&mut self, record: CommandRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records, newest first
    pub fn iter(&self) -> impl Iterator<Item = &CommandRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<CommandRecord> {
        self.records.iter().cloned().collect()
    }
}

/// Connection flag, robot state and command history, safe to share across threads
#[derive(Debug)]
pub struct StateProjection {
    connected: AtomicBool,
    robot: RwLock<RobotState>,
    history: RwLock<CommandLog>,
    telemetry_lines: AtomicU64,
    parse_errors: AtomicU64,
}

impl StateProjection {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            connected: AtomicBool::new(false),
            robot: RwLock::new(RobotState::default()),
            history: RwLock::new(CommandLog::new(history_capacity)),
            telemetry_lines: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        }
    }

    /// Fold one link event into the projection
    pub fn apply(&self, event: &LinkEvent) {
        match event {
            LinkEvent::Connected(connected) => {
                self.connected.store(*connected, Ordering::Release);
            }
            LinkEvent::CommandSent(record) => self.history.write().push(record.clone()),
            LinkEvent::Telemetry(telemetry) => {
                self.telemetry_lines.fetch_add(1, Ordering::Relaxed);
                let line = telemetry.text();
                match parse_line(&line) {
                    Ok(fields) => {
                        let mut robot = self.robot.write();
                        for field in &fields {
                            robot.apply(field);
                        }
                    }
                    Err(e) => {
                        self.parse_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Unparsed status line {:?}: {}", line, e);
                    }
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn robot_state(&self) -> RobotState {
        self.robot.read().clone()
    }

    /// Recent commands, newest first
    pub fn command_history(&self) -> Vec<CommandRecord> {
        self.history.read().to_vec()
    }

    pub fn telemetry_lines(&self) -> u64 {
        self.telemetry_lines.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }
}

/// Feed `projection` from `subscription` on a background thread.
///
/// The thread ends when the link manager that issued the subscription is dropped.
pub fn spawn_projection(
    projection: Arc<StateProjection>,
    subscription: Subscription,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("projection".into())
        .spawn(move || {
            while let Ok(event) = subscription.recv() {
                projection.apply(&event);
            }
            tracing::debug!("Projection thread exiting");
        })?;
    Ok(handle)
}
