//! Status report serialization.
//!
//! One status line is emitted per report pass:
//!
//! ```text
//! {"name":"scope_controller","uptime":"12s","num":"12","devices":[{"name":"led","pin_number":"13","pin_value":"1"}]}
//! ```
//!
//! Numeric fields travel as decimal strings, which is what existing host
//! tooling expects. The accessors on [`StatusReport`] and [`DeviceFragment`]
//! turn them back into integers.

use crate::registry::DeviceRegistry;
use crate::scheduler::ReportTick;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const MAX_STATUS_LINE_SIZE: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("status line is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("status line exceeds {} bytes", MAX_STATUS_LINE_SIZE)]
    MessageTooLarge,
    #[error("field `{field}` is not a number: {raw:?}")]
    InvalidNumber { field: &'static str, raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFragment {
    pub name: String,
    pub pin_number: String,
    pub pin_value: String,
}

impl DeviceFragment {
    pub fn new(name: &str, pin_number: u16, pin_value: i32) -> Self {
        Self {
            name: name.to_string(),
            pin_number: pin_number.to_string(),
            pin_value: pin_value.to_string(),
        }
    }

    pub fn pin_number(&self) -> Result<u16, TelemetryError> {
        parse_field("pin_number", &self.pin_number)
    }

    pub fn pin_value(&self) -> Result<i32, TelemetryError> {
        parse_field("pin_value", &self.pin_value)
    }

    pub fn to_json(&self) -> Result<String, TelemetryError> {
        serde_json::to_string(self).map_err(|e| TelemetryError::InvalidJson(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub name: String,
    pub uptime: String,
    pub num: String,
    pub devices: Vec<DeviceFragment>,
}

impl StatusReport {
    pub fn new(name: &str, uptime_secs: u64, counter: u32, devices: Vec<DeviceFragment>) -> Self {
        Self {
            name: name.to_string(),
            uptime: format!("{}s", uptime_secs),
            num: counter.to_string(),
            devices,
        }
    }

    pub fn uptime_secs(&self) -> Result<u64, TelemetryError> {
        let raw = self.uptime.strip_suffix('s').unwrap_or(&self.uptime);
        parse_field("uptime", raw)
    }

    pub fn counter(&self) -> Result<u32, TelemetryError> {
        parse_field("num", &self.num)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceFragment> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Serializes to a single line, without the trailing newline.
    pub fn to_line(&self) -> Result<String, TelemetryError> {
        let line =
            serde_json::to_string(self).map_err(|e| TelemetryError::InvalidJson(e.to_string()))?;
        if line.len() > MAX_STATUS_LINE_SIZE {
            return Err(TelemetryError::MessageTooLarge);
        }
        Ok(line)
    }

    pub fn parse(line: &str) -> Result<Self, TelemetryError> {
        let line = line.trim();
        if line.len() > MAX_STATUS_LINE_SIZE {
            return Err(TelemetryError::MessageTooLarge);
        }
        serde_json::from_str(line).map_err(|e| TelemetryError::InvalidJson(e.to_string()))
    }
}

/// Runs one report pass: `collect()` then `report()` on every device, in
/// registration order.
pub fn report_pass(name: &str, tick: ReportTick, registry: &mut DeviceRegistry) -> StatusReport {
    let mut devices = Vec::with_capacity(registry.len());
    for device in registry.devices_mut() {
        device.collect();
        devices.push(device.report());
    }
    debug!(counter = tick.counter, devices = devices.len(), "report pass");
    StatusReport::new(name, tick.uptime_secs, tick.counter, devices)
}

/// Returns the board `name` of any JSON status line, whatever else it holds.
pub fn board_name(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    value.get("name")?.as_str().map(str::to_string)
}

fn parse_field<T: core::str::FromStr>(field: &'static str, raw: &str) -> Result<T, TelemetryError> {
    raw.trim().parse().map_err(|_| TelemetryError::InvalidNumber {
        field,
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_shape() {
        let report = StatusReport::new(
            "scope_controller",
            3,
            4,
            vec![DeviceFragment::new("led", 13, 1)],
        );

        let line = report.to_line().unwrap();
        assert_eq!(
            line,
            r#"{"name":"scope_controller","uptime":"3s","num":"4","devices":[{"name":"led","pin_number":"13","pin_value":"1"}]}"#
        );
    }

    #[test]
    fn test_fragment_fields_recover_integers() {
        let fragment = DeviceFragment::new("air", 1, -45);
        let parsed: DeviceFragment = serde_json::from_str(&fragment.to_json().unwrap()).unwrap();

        assert_eq!(parsed.pin_number().unwrap(), 1);
        assert_eq!(parsed.pin_value().unwrap(), -45);
    }

    #[test]
    fn test_parse_status_line() {
        let line = r#"{"name":"scope_controller","uptime":"12s","num":"7","devices":[]}"#;
        let report = StatusReport::parse(line).unwrap();

        assert_eq!(report.uptime_secs().unwrap(), 12);
        assert_eq!(report.counter().unwrap(), 7);
        assert!(report.devices.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            StatusReport::parse("EXIT setup()"),
            Err(TelemetryError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_invalid_number_field() {
        let fragment = DeviceFragment {
            name: "led".into(),
            pin_number: "thirteen".into(),
            pin_value: "0".into(),
        };
        assert_eq!(
            fragment.pin_number(),
            Err(TelemetryError::InvalidNumber {
                field: "pin_number",
                raw: "thirteen".into()
            })
        );
    }

    #[test]
    fn test_board_name_from_foreign_line() {
        assert_eq!(
            board_name(r#"{"name":"camera_board","humidity":40}"#).as_deref(),
            Some("camera_board")
        );
        assert_eq!(board_name(r#"{"humidity":40}"#), None);
        assert_eq!(board_name("not json"), None);
    }
}
