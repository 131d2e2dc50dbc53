//! Start-up notification strategies.
//!
//! Run once after every device is initialized and before the control loop
//! starts, so an operator can tell at a glance whether the board came up with
//! a console attached.

use crate::devices::DeviceId;
use crate::registry::DeviceRegistry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Toggle count and spacing of a blink sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub toggles: u32,
    pub period_ms: u64,
}

/// Two seconds of fast blinks.
pub const CONSOLE_PATTERN: BlinkPattern = BlinkPattern {
    toggles: 40,
    period_ms: 50,
};

/// Two seconds of slow blinks.
pub const HEADLESS_PATTERN: BlinkPattern = BlinkPattern {
    toggles: 10,
    period_ms: 200,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartupSignal {
    /// Blink the indicator of the given device.
    Blink { device: DeviceId },
    /// Log a ready line only.
    Banner,
    Silent,
}

impl Default for StartupSignal {
    fn default() -> Self {
        StartupSignal::Blink {
            device: DeviceId(13),
        }
    }
}

pub trait Delay: Send {
    fn delay_ms(&mut self, ms: u64);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
}

/// Accumulates requested delays instead of sleeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay {
    pub total_ms: u64,
}

impl Delay for NoDelay {
    fn delay_ms(&mut self, ms: u64) {
        self.total_ms += ms;
    }
}

pub trait StartupNotifier: Send {
    /// Signals init-complete. Must return after a bounded time.
    fn notify(&mut self, registry: &mut DeviceRegistry, console_attached: bool);
}

pub struct BlinkNotifier {
    indicator: DeviceId,
    delay: Box<dyn Delay>,
}

impl BlinkNotifier {
    pub fn new(indicator: DeviceId, delay: Box<dyn Delay>) -> Self {
        Self { indicator, delay }
    }

    pub fn pattern(console_attached: bool) -> BlinkPattern {
        if console_attached {
            CONSOLE_PATTERN
        } else {
            HEADLESS_PATTERN
        }
    }
}

impl StartupNotifier for BlinkNotifier {
    fn notify(&mut self, registry: &mut DeviceRegistry, console_attached: bool) {
        let pattern = Self::pattern(console_attached);
        let Some(device) = registry.get_mut(self.indicator) else {
            warn!(device = %self.indicator, "start-up indicator is not registered");
            return;
        };

        for _ in 0..pattern.toggles {
            self.delay.delay_ms(pattern.period_ms);
            if !device.toggle_indicator() {
                warn!(device = %self.indicator, "device has no indicator to blink");
                return;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct BannerNotifier;

impl StartupNotifier for BannerNotifier {
    fn notify(&mut self, registry: &mut DeviceRegistry, console_attached: bool) {
        info!(
            devices = registry.len(),
            console_attached, "controller initialized"
        );
    }
}

#[derive(Debug, Default)]
pub struct SilentNotifier;

impl StartupNotifier for SilentNotifier {
    fn notify(&mut self, _registry: &mut DeviceRegistry, _console_attached: bool) {}
}

pub fn notifier_for(signal: StartupSignal, delay: Box<dyn Delay>) -> Box<dyn StartupNotifier> {
    match signal {
        StartupSignal::Blink { device } => Box::new(BlinkNotifier::new(device, delay)),
        StartupSignal::Banner => Box::new(BannerNotifier),
        StartupSignal::Silent => Box::new(SilentNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Device, Led, Relay};
    use crate::hal::SimulatedPin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedDelay(Arc<AtomicU64>);

    impl Delay for SharedDelay {
        fn delay_ms(&mut self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    fn registry_with_led(pin: &SimulatedPin) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        let mut led = Led::new("led", pin.clone());
        led.init();
        registry.register(DeviceId(13), Box::new(led)).unwrap();
        registry
    }

    #[test]
    fn test_console_pattern_blinks_fast() {
        let pin = SimulatedPin::new(13);
        let mut registry = registry_with_led(&pin);
        let writes_before = pin.write_count();
        let delay = SharedDelay::default();

        BlinkNotifier::new(DeviceId(13), Box::new(delay.clone())).notify(&mut registry, true);

        assert_eq!(pin.write_count() - writes_before, 40);
        assert_eq!(delay.0.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn test_headless_pattern_blinks_slow() {
        let pin = SimulatedPin::new(13);
        let mut registry = registry_with_led(&pin);
        let writes_before = pin.write_count();
        let delay = SharedDelay::default();

        BlinkNotifier::new(DeviceId(13), Box::new(delay.clone())).notify(&mut registry, false);

        assert_eq!(pin.write_count() - writes_before, 10);
        assert_eq!(delay.0.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn test_blink_on_device_without_indicator_stops() {
        let pin = SimulatedPin::new(4);
        let mut registry = DeviceRegistry::new();
        registry
            .register(DeviceId(4), Box::new(Relay::new("fan", pin.clone())))
            .unwrap();
        let delay = SharedDelay::default();

        BlinkNotifier::new(DeviceId(4), Box::new(delay.clone())).notify(&mut registry, true);

        assert_eq!(pin.write_count(), 0);
        assert_eq!(delay.0.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_startup_signal_serde() {
        let json = serde_json::to_string(&StartupSignal::Blink { device: DeviceId(13) }).unwrap();
        assert_eq!(json, r#"{"mode":"blink","device":13}"#);

        let banner: StartupSignal = serde_json::from_str(r#"{"mode":"banner"}"#).unwrap();
        assert_eq!(banner, StartupSignal::Banner);
    }
}
