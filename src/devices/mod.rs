pub mod led;
pub mod relay;
pub mod servo;
pub mod sensor;

pub use led::Led;
pub use relay::Relay;
pub use sensor::TemperatureSensor;
pub use servo::Servo;

use crate::config::{DeviceKind, DeviceSpec};
use crate::hal::{SimulatedPin, SimulatedProbe, SimulatedPwm};
use crate::registry::{DeviceRegistry, RegistryError};
use crate::telemetry::DeviceFragment;
use serde::{Deserialize, Serialize};

/// Protocol address of a device; on the original boards this was the pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u16);

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a device did with a `set_value` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actuation {
    Applied,
    /// The request was out of range and the device applied this value instead.
    Clamped(u32),
    /// The device has nothing to actuate.
    Ignored,
}

/// Capability set every controllable or observable unit implements.
///
/// None of these calls may fail loudly: a device that cannot do its job
/// degrades to a default observable value and keeps going.
pub trait Device: Send {
    fn name(&self) -> &str;

    fn pin(&self) -> u16;

    /// Idempotent hardware setup. May block briefly, never indefinitely.
    fn init(&mut self);

    fn set_value(&mut self, value: u32) -> Actuation;

    /// Refreshes the observable snapshot without touching actuation.
    fn collect(&mut self);

    /// Serializes the last collected snapshot. Before the first `collect()`
    /// the snapshot value is `0`.
    fn report(&self) -> DeviceFragment;

    /// Called every main-loop iteration.
    fn tick(&mut self, _now_ms: u64) {}

    /// Drives the device's visible indicator, if it has one. Used for
    /// start-up signalling.
    fn toggle_indicator(&mut self) -> bool {
        false
    }
}

/// Handles onto the simulated hardware behind a registry built by
/// [`build_simulated`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    pins: Vec<(DeviceId, SimulatedPin)>,
    pwms: Vec<(DeviceId, SimulatedPwm)>,
    probes: Vec<(DeviceId, SimulatedProbe)>,
}

impl SimulatedBoard {
    pub fn pin(&self, id: DeviceId) -> Option<&SimulatedPin> {
        self.pins.iter().find(|(i, _)| *i == id).map(|(_, p)| p)
    }

    pub fn pwm(&self, id: DeviceId) -> Option<&SimulatedPwm> {
        self.pwms.iter().find(|(i, _)| *i == id).map(|(_, p)| p)
    }

    pub fn probe(&self, id: DeviceId) -> Option<&SimulatedProbe> {
        self.probes.iter().find(|(i, _)| *i == id).map(|(_, p)| p)
    }
}

/// Builds a registry of devices backed by in-memory hardware, in spec order.
pub fn build_simulated(specs: &[DeviceSpec]) -> Result<(DeviceRegistry, SimulatedBoard), RegistryError> {
    let mut registry = DeviceRegistry::new();
    let mut board = SimulatedBoard::default();

    for spec in specs {
        let device: Box<dyn Device> = match spec.kind {
            DeviceKind::Led { blink_period_ms } => {
                let pin = SimulatedPin::new(spec.pin());
                board.pins.push((spec.id, pin.clone()));
                let led = Led::new(&spec.name, pin);
                match blink_period_ms {
                    Some(period) => Box::new(led.with_blink_period(period)),
                    None => Box::new(led),
                }
            }
            DeviceKind::Relay => {
                let pin = SimulatedPin::new(spec.pin());
                board.pins.push((spec.id, pin.clone()));
                Box::new(Relay::new(&spec.name, pin))
            }
            DeviceKind::Servo {
                min_pulse_us,
                max_pulse_us,
            } => {
                let pwm = SimulatedPwm::new(spec.pin());
                board.pwms.push((spec.id, pwm.clone()));
                Box::new(Servo::with_pulse_range(&spec.name, pwm, min_pulse_us, max_pulse_us))
            }
            DeviceKind::TemperatureSensor { initial_reading } => {
                let probe = SimulatedProbe::new(spec.pin(), initial_reading);
                board.probes.push((spec.id, probe.clone()));
                Box::new(TemperatureSensor::new(&spec.name, probe))
            }
        };
        registry.register(spec.id, device)?;
    }

    Ok((registry, board))
}
