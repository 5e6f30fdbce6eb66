//! Robot command encoding.
//!
//! Commands travel as single ASCII tokens, one per line:
//!
//! | Command | Token |
//! |---------|-------|
//! | `Move { Forward, 128 }` | `FORWARD:128` |
//! | `Stop` | `STOP` |
//! | `EmergencyStop` | `EMERGENCY_STOP` |
//! | `SetTarget { 1.5, -2.0 }` | `TARGET:1.5,-2.0` |
//! | `StartAutonomous` / `StopAutonomous` | `START_AUTO` / `STOP_AUTO` |
//! | `StartFigure8` / `StopFigure8` | `START_FIGURE8` / `STOP_FIGURE8` |
//! | `RequestStatus` | `REQUEST_STATUS` |
//! | `Reset` | `RESET` |
//!
//! The line delimiter is not part of the token; the link manager appends it.

use crate::error::{Result, SetuError};
use std::fmt;
use std::str::FromStr;

/// Drive direction for manual motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

/// Typed robot command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Manual drive; speed is the raw motor duty 0-255
    Move { direction: Direction, speed: u8 },
    Stop,
    EmergencyStop,
    /// Navigate to a point in the robot's frame
    SetTarget { x: f32, y: f32 },
    StartAutonomous,
    StopAutonomous,
    StartFigure8,
    StopFigure8,
    RequestStatus,
    Reset,
}

impl Command {
    /// Build a move command, clamping `speed` into 0..=255.
    pub fn drive(direction: Direction, speed: i32) -> Self {
        Command::Move {
            direction,
            speed: speed.clamp(0, u8::MAX as i32) as u8,
        }
    }

    /// Wire token for this command
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move { direction, speed } => write!(f, "{}:{}", direction.as_str(), speed),
            Command::Stop => f.write_str("STOP"),
            Command::EmergencyStop => f.write_str("EMERGENCY_STOP"),
            Command::SetTarget { x, y } => {
                write!(f, "TARGET:{},{}", decimal(*x), decimal(*y))
            }
            Command::StartAutonomous => f.write_str("START_AUTO"),
            Command::StopAutonomous => f.write_str("STOP_AUTO"),
            Command::StartFigure8 => f.write_str("START_FIGURE8"),
            Command::StopFigure8 => f.write_str("STOP_FIGURE8"),
            Command::RequestStatus => f.write_str("REQUEST_STATUS"),
            Command::Reset => f.write_str("RESET"),
        }
    }
}

impl FromStr for Command {
    type Err = SetuError;

    /// Parse a wire token (case-insensitive, surrounding whitespace ignored).
    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_ascii_uppercase();
        let (name, arg) = match token.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (token.as_str(), None),
        };

        let command = match (name, arg) {
            ("FORWARD", Some(speed)) => Command::drive(Direction::Forward, parse_speed(speed)?),
            ("BACKWARD", Some(speed)) => Command::drive(Direction::Backward, parse_speed(speed)?),
            ("LEFT", Some(speed)) => Command::drive(Direction::Left, parse_speed(speed)?),
            ("RIGHT", Some(speed)) => Command::drive(Direction::Right, parse_speed(speed)?),
            ("TARGET", Some(point)) => {
                let (x, y) = point
                    .split_once(',')
                    .ok_or_else(|| SetuError::InvalidCommand(format!("expected x,y in {}", s)))?;
                Command::SetTarget {
                    x: parse_coord(x)?,
                    y: parse_coord(y)?,
                }
            }
            ("STOP", None) => Command::Stop,
            ("EMERGENCY_STOP", None) => Command::EmergencyStop,
            ("START_AUTO", None) => Command::StartAutonomous,
            ("STOP_AUTO", None) => Command::StopAutonomous,
            ("START_FIGURE8", None) => Command::StartFigure8,
            ("STOP_FIGURE8", None) => Command::StopFigure8,
            ("REQUEST_STATUS", None) => Command::RequestStatus,
            ("RESET", None) => Command::Reset,
            _ => return Err(SetuError::InvalidCommand(s.trim().to_string())),
        };
        Ok(command)
    }
}

/// Plain decimal rendering that always carries a decimal point ("2.0", "0.00001")
fn decimal(value: f32) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text + ".0"
    } else {
        text
    }
}

/// Parse a speed; out-of-range integers saturate and are clamped by `drive`
fn parse_speed(s: &str) -> Result<i32> {
    let digits = s.trim();
    if let Ok(speed) = digits.parse::<i32>() {
        return Ok(speed);
    }
    let unsigned = digits.strip_prefix(['+', '-']).unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SetuError::InvalidCommand(format!("invalid speed: {}", s)));
    }
    Ok(if digits.starts_with('-') { i32::MIN } else { i32::MAX })
}

fn parse_coord(s: &str) -> Result<f32> {
    let value: f32 = s
        .trim()
        .parse()
        .map_err(|_| SetuError::InvalidCommand(format!("invalid coordinate: {}", s)))?;
    if !value.is_finite() {
        return Err(SetuError::InvalidCommand(format!("non-finite coordinate: {}", s)));
    }
    Ok(value)
}
