use super::{Actuation, Device};
use crate::hal::DigitalPin;
use crate::telemetry::DeviceFragment;

/// On/off relay (dew heaters, fans, camera power) with pin read-back.
#[derive(Debug)]
pub struct Relay<P: DigitalPin> {
    name: String,
    pin: P,
    status: Option<bool>,
}

impl<P: DigitalPin> Relay<P> {
    pub fn new(name: &str, pin: P) -> Self {
        Self {
            name: name.to_string(),
            pin,
            status: None,
        }
    }

    /// Last collected state, `None` before the first `collect()`.
    pub fn status(&self) -> Option<bool> {
        self.status
    }
}

impl<P: DigitalPin> Device for Relay<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pin(&self) -> u16 {
        self.pin.number()
    }

    fn init(&mut self) {
        self.pin.configure_output();
    }

    fn set_value(&mut self, value: u32) -> Actuation {
        self.pin.write(value != 0);
        Actuation::Applied
    }

    fn collect(&mut self) {
        self.status = Some(self.pin.read());
    }

    fn report(&self) -> DeviceFragment {
        let value = self.status.map_or(0, i32::from);
        DeviceFragment::new(&self.name, self.pin.number(), value)
    }
}
