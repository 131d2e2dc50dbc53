use super::{Actuation, Device};
use crate::hal::DigitalPin;
use crate::telemetry::DeviceFragment;

/// On/off LED with optional periodic auto-toggle.
///
/// An explicit `set_value` takes over from auto-toggle until the LED is
/// re-initialized.
#[derive(Debug)]
pub struct Led<P: DigitalPin> {
    name: String,
    pin: P,
    blink_period_ms: Option<u64>,
    blinking: bool,
    next_toggle_ms: u64,
    lit: bool,
    snapshot: Option<bool>,
}

impl<P: DigitalPin> Led<P> {
    pub fn new(name: &str, pin: P) -> Self {
        Self {
            name: name.to_string(),
            pin,
            blink_period_ms: None,
            blinking: false,
            next_toggle_ms: 0,
            lit: false,
            snapshot: None,
        }
    }

    pub fn with_blink_period(mut self, period_ms: u64) -> Self {
        self.blink_period_ms = Some(period_ms.max(1));
        self
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn is_blinking(&self) -> bool {
        self.blinking
    }

    fn drive(&mut self, lit: bool) {
        self.lit = lit;
        self.pin.write(lit);
    }
}

impl<P: DigitalPin> Device for Led<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pin(&self) -> u16 {
        self.pin.number()
    }

    fn init(&mut self) {
        self.pin.configure_output();
        self.drive(false);
        self.blinking = self.blink_period_ms.is_some();
        self.next_toggle_ms = 0;
    }

    fn set_value(&mut self, value: u32) -> Actuation {
        self.blinking = false;
        self.drive(value != 0);
        Actuation::Applied
    }

    fn collect(&mut self) {
        self.snapshot = Some(self.pin.read());
    }

    fn report(&self) -> DeviceFragment {
        let value = self.snapshot.map_or(0, i32::from);
        DeviceFragment::new(&self.name, self.pin.number(), value)
    }

    fn tick(&mut self, now_ms: u64) {
        let Some(period) = self.blink_period_ms else {
            return;
        };
        if !self.blinking || now_ms < self.next_toggle_ms {
            return;
        }

        self.drive(!self.lit);
        self.next_toggle_ms = self.next_toggle_ms.saturating_add(period);
        if self.next_toggle_ms <= now_ms {
            self.next_toggle_ms = now_ms.saturating_add(period);
        }
    }

    fn toggle_indicator(&mut self) -> bool {
        self.drive(!self.lit);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedPin;

    #[test]
    fn test_led_auto_toggle() {
        let pin = SimulatedPin::new(13);
        let mut led = Led::new("led", pin.clone()).with_blink_period(500);
        led.init();

        led.tick(0);
        assert!(pin.read());
        led.tick(200);
        assert!(pin.read());
        led.tick(500);
        assert!(!pin.read());
    }

    #[test]
    fn test_set_value_stops_auto_toggle() {
        let pin = SimulatedPin::new(13);
        let mut led = Led::new("led", pin.clone()).with_blink_period(100);
        led.init();
        assert!(led.is_blinking());

        led.set_value(1);
        for now in (0..1000).step_by(50) {
            led.tick(now);
        }
        assert!(pin.read());
        assert!(!led.is_blinking());
    }

    #[test]
    fn test_report_before_collect_is_zero() {
        let pin = SimulatedPin::new(13);
        let mut led = Led::new("led", pin);
        led.init();
        led.set_value(1);

        assert_eq!(led.report().pin_value, "0");
        led.collect();
        assert_eq!(led.report().pin_value, "1");
    }
}
