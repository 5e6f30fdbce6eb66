//! Robot status lines and the state they describe.
//!
//! A status line carries one or more `KEY:VALUE` fields separated by `;`:
//!
//! ```text
//! POS:1.25,-0.40,90.0;BAT:11.8;US:34,120;IR:1024,990,1010,1024,1024,870,1024,1024;MODE:AUTO
//! ```
//!
//! | Key | Value |
//! |-----|-------|
//! | `POS` | x, y, orientation |
//! | `BAT` | battery voltage |
//! | `US` | left, right ultrasonic distance |
//! | `IR` | eight infrared readings |
//! | `MODE` | controller mode name |
//!
//! Unknown keys are tolerated so firmware can add fields without breaking clients.

use crate::error::{Result, SetuError};

/// Number of infrared sensors on the chassis
pub const IR_SENSOR_COUNT: usize = 8;

/// One decoded status field
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryField {
    Position { x: f32, y: f32, orientation: f32 },
    Battery(f32),
    Ultrasonic { left: i32, right: i32 },
    Infrared([i32; IR_SENSOR_COUNT]),
    Mode(String),
    Unknown(String),
}

/// Last known robot state
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    pub position_x: f32,
    pub position_y: f32,
    pub orientation: f32,
    pub battery_level: f32,
    pub left_ultrasonic: i32,
    pub right_ultrasonic: i32,
    pub ir_sensors: [i32; IR_SENSOR_COUNT],
    pub mode: String,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            position_x: 0.0,
            position_y: 0.0,
            orientation: 0.0,
            battery_level: 12.0,
            left_ultrasonic: 0,
            right_ultrasonic: 0,
            ir_sensors: [1024; IR_SENSOR_COUNT],
            mode: "IDLE".to_string(),
        }
    }
}

impl RobotState {
    pub fn apply(&mut self, field: &TelemetryField) {
        match field {
            TelemetryField::Position { x, y, orientation } => {
                self.position_x = *x;
                self.position_y = *y;
                self.orientation = *orientation;
            }
            TelemetryField::Battery(level) => self.battery_level = *level,
            TelemetryField::Ultrasonic { left, right } => {
                self.left_ultrasonic = *left;
                self.right_ultrasonic = *right;
            }
            TelemetryField::Infrared(values) => self.ir_sensors = *values,
            TelemetryField::Mode(mode) => self.mode = mode.clone(),
            TelemetryField::Unknown(_) => {}
        }
    }
}

/// Parse a status line into its fields.
///
/// Fails on the first malformed field; callers should then leave their
/// state untouched.
pub fn parse_line(line: &str) -> Result<Vec<TelemetryField>> {
    line.split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(parse_field)
        .collect()
}

fn parse_field(field: &str) -> Result<TelemetryField> {
    let Some((key, value)) = field.split_once(':') else {
        return Ok(TelemetryField::Unknown(field.to_string()));
    };
    let value = value.trim();

    match key.trim().to_ascii_uppercase().as_str() {
        "POS" => {
            let [x, y, orientation] = parse_list::<f32, 3>(key, value)?;
            Ok(TelemetryField::Position { x, y, orientation })
        }
        "BAT" => Ok(TelemetryField::Battery(parse_value(key, value)?)),
        "US" => {
            let [left, right] = parse_list::<i32, 2>(key, value)?;
            Ok(TelemetryField::Ultrasonic { left, right })
        }
        "IR" => Ok(TelemetryField::Infrared(parse_list::<i32, IR_SENSOR_COUNT>(
            key, value,
        )?)),
        "MODE" if !value.is_empty() => Ok(TelemetryField::Mode(value.to_string())),
        "MODE" => Err(SetuError::Telemetry("empty MODE".into())),
        _ => Ok(TelemetryField::Unknown(field.to_string())),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SetuError::Telemetry(format!("bad {} value: {}", key, value)))
}

fn parse_list<T: std::str::FromStr + Copy + Default, const N: usize>(
    key: &str,
    value: &str,
) -> Result<[T; N]> {
    let mut out = [T::default(); N];
    let mut parts = value.split(',');
    for slot in out.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| SetuError::Telemetry(format!("{} needs {} values", key, N)))?;
        *slot = parse_value(key, part)?;
    }
    if parts.next().is_some() {
        return Err(SetuError::Telemetry(format!(
            "{} takes {} values: {}",
            key, N, value
        )));
    }
    Ok(out)
}
