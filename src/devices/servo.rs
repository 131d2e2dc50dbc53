use super::{Actuation, Device};
use crate::hal::PwmOutput;
use crate::telemetry::DeviceFragment;

pub const MAX_ANGLE: u32 = 180;
pub const DEFAULT_MIN_PULSE_US: u16 = 544;
pub const DEFAULT_MAX_PULSE_US: u16 = 2400;

/// Hobby servo driven by angle (0-180), mapped onto a pulse-width window.
///
/// Servos give no position feedback, so `collect()` snapshots the last
/// commanded angle.
#[derive(Debug)]
pub struct Servo<P: PwmOutput> {
    name: String,
    pwm: P,
    min_pulse_us: u16,
    max_pulse_us: u16,
    angle: u32,
    snapshot: Option<u32>,
}

impl<P: PwmOutput> Servo<P> {
    pub fn new(name: &str, pwm: P) -> Self {
        Self::with_pulse_range(name, pwm, DEFAULT_MIN_PULSE_US, DEFAULT_MAX_PULSE_US)
    }

    pub fn with_pulse_range(name: &str, pwm: P, min_pulse_us: u16, max_pulse_us: u16) -> Self {
        let (min_pulse_us, max_pulse_us) = if min_pulse_us <= max_pulse_us {
            (min_pulse_us, max_pulse_us)
        } else {
            (max_pulse_us, min_pulse_us)
        };
        Self {
            name: name.to_string(),
            pwm,
            min_pulse_us,
            max_pulse_us,
            angle: 0,
            snapshot: None,
        }
    }

    pub fn angle(&self) -> u32 {
        self.angle
    }

    pub fn pulse_for_angle(&self, angle: u32) -> u16 {
        let span = u32::from(self.max_pulse_us - self.min_pulse_us);
        let angle = angle.min(MAX_ANGLE);
        self.min_pulse_us + (span * angle / MAX_ANGLE) as u16
    }
}

impl<P: PwmOutput> Device for Servo<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pin(&self) -> u16 {
        self.pwm.number()
    }

    fn init(&mut self) {
        self.pwm.attach();
    }

    fn set_value(&mut self, value: u32) -> Actuation {
        let angle = value.min(MAX_ANGLE);
        self.angle = angle;
        let pulse = self.pulse_for_angle(angle);
        self.pwm.write_pulse_us(pulse);

        if angle == value {
            Actuation::Applied
        } else {
            Actuation::Clamped(angle)
        }
    }

    fn collect(&mut self) {
        self.snapshot = Some(self.angle);
    }

    fn report(&self) -> DeviceFragment {
        let value = self.snapshot.unwrap_or(0) as i32;
        DeviceFragment::new(&self.name, self.pwm.number(), value)
    }
}
