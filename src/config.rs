//! Controller configuration.
//!
//! `ControllerConfig::default()` describes the telescope controller board:
//! status LED, two dust-cap servos, four relays and three temperature probes,
//! each addressed by its pin number. A JSON file can replace any part of it.

use crate::devices::DeviceId;
use crate::protocol::MAX_TOKEN_LEN;
use crate::registry::MAX_DEVICES;
use crate::scheduler::DEFAULT_REPORT_INTERVAL_MS;
use crate::startup::StartupSignal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONTROLLER_NAME: &str = "scope_controller";
pub const DEFAULT_TOKEN_LIMIT: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceKind {
    Led {
        #[serde(default)]
        blink_period_ms: Option<u64>,
    },
    Relay,
    Servo {
        min_pulse_us: u16,
        max_pulse_us: u16,
    },
    TemperatureSensor {
        #[serde(default)]
        initial_reading: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: DeviceId,
    pub name: String,
    /// Hardware pin; defaults to the id.
    #[serde(default)]
    pub pin: Option<u16>,
    #[serde(flatten)]
    pub kind: DeviceKind,
}

impl DeviceSpec {
    pub fn new(id: u16, name: &str, kind: DeviceKind) -> Self {
        Self {
            id: DeviceId(id),
            name: name.to_string(),
            pin: None,
            kind,
        }
    }

    pub fn pin(&self) -> u16 {
        self.pin.unwrap_or(self.id.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub name: String,
    pub report_interval_ms: u64,
    pub max_token_len: usize,
    pub console_attached: bool,
    pub startup: StartupSignal,
    pub devices: Vec<DeviceSpec>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let relay = |id: u16, name: &str| DeviceSpec::new(id, name, DeviceKind::Relay);
        let probe = |id: u16, name: &str| {
            DeviceSpec::new(id, name, DeviceKind::TemperatureSensor { initial_reading: 150 })
        };

        Self {
            name: DEFAULT_CONTROLLER_NAME.to_string(),
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            max_token_len: DEFAULT_TOKEN_LIMIT,
            console_attached: true,
            startup: StartupSignal::default(),
            devices: vec![
                DeviceSpec::new(13, "led_handler", DeviceKind::Led { blink_period_ms: None }),
                // Futaba S3050
                DeviceSpec::new(
                    9,
                    "scope_dustcap",
                    DeviceKind::Servo {
                        min_pulse_us: 780,
                        max_pulse_us: 2180,
                    },
                ),
                // Futaba S3003
                DeviceSpec::new(
                    10,
                    "finder_dustcap",
                    DeviceKind::Servo {
                        min_pulse_us: 550,
                        max_pulse_us: 2350,
                    },
                ),
                relay(11, "scope_dew"),
                relay(4, "finder_dew"),
                relay(5, "camera_0"),
                relay(6, "scope_fan"),
                probe(0, "scope"),
                probe(1, "air"),
                probe(2, "box"),
            ],
        }
    }
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("controller name is empty".into()));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::Invalid("report interval must be non-zero".into()));
        }
        if self.max_token_len == 0 || self.max_token_len > MAX_TOKEN_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_token_len must be between 1 and {}",
                MAX_TOKEN_LEN
            )));
        }
        if self.devices.len() > MAX_DEVICES {
            return Err(ConfigError::Invalid(format!(
                "{} devices configured, at most {} supported",
                self.devices.len(),
                MAX_DEVICES
            )));
        }

        for (i, spec) in self.devices.iter().enumerate() {
            if self.devices[..i].iter().any(|other| other.id == spec.id) {
                return Err(ConfigError::Invalid(format!("duplicate device id {}", spec.id)));
            }
            if let DeviceKind::Servo {
                min_pulse_us,
                max_pulse_us,
            } = spec.kind
            {
                if min_pulse_us > max_pulse_us {
                    return Err(ConfigError::Invalid(format!(
                        "servo {} has min pulse above max pulse",
                        spec.name
                    )));
                }
            }
        }

        if let StartupSignal::Blink { device } = self.startup {
            match self.devices.iter().find(|d| d.id == device) {
                Some(DeviceSpec {
                    kind: DeviceKind::Led { .. },
                    ..
                }) => {}
                Some(_) => {
                    return Err(ConfigError::Invalid(format!(
                        "start-up indicator {} is not an LED",
                        device
                    )))
                }
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "start-up indicator {} is not configured",
                        device
                    )))
                }
            }
        }

        Ok(())
    }
}
