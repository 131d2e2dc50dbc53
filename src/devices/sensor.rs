use super::{Actuation, Device};
use crate::hal::SensorProbe;
use crate::telemetry::DeviceFragment;
use tracing::warn;

/// Read-only temperature probe, reported in tenths of a degree.
///
/// A failed read keeps the last good value; the failure only shows up in
/// the log and in [`TemperatureSensor::failed_reads`].
#[derive(Debug)]
pub struct TemperatureSensor<P: SensorProbe> {
    name: String,
    probe: P,
    last_reading: Option<i32>,
    failed_reads: u32,
}

impl<P: SensorProbe> TemperatureSensor<P> {
    pub fn new(name: &str, probe: P) -> Self {
        Self {
            name: name.to_string(),
            probe,
            last_reading: None,
            failed_reads: 0,
        }
    }

    pub fn last_reading(&self) -> Option<i32> {
        self.last_reading
    }

    pub fn failed_reads(&self) -> u32 {
        self.failed_reads
    }
}

impl<P: SensorProbe> Device for TemperatureSensor<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pin(&self) -> u16 {
        self.probe.number()
    }

    fn init(&mut self) {
        self.probe.begin();
    }

    fn set_value(&mut self, _value: u32) -> Actuation {
        Actuation::Ignored
    }

    fn collect(&mut self) {
        match self.probe.read() {
            Ok(reading) => self.last_reading = Some(reading),
            Err(e) => {
                self.failed_reads = self.failed_reads.saturating_add(1);
                warn!(sensor = %self.name, error = %e, "sensor read failed, keeping last value");
            }
        }
    }

    fn report(&self) -> DeviceFragment {
        DeviceFragment::new(&self.name, self.probe.number(), self.last_reading.unwrap_or(0))
    }
}
