//! Hardware ports used by the device drivers.
//!
//! The drivers in [`crate::devices`] only talk to these traits. The host build
//! uses the simulated implementations below, which track pin state in memory.
//! Simulated handles are cheap to clone and every clone observes the same pin,
//! so tests and the controller binary can inspect what a driver did.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub trait DigitalPin: Send {
    fn number(&self) -> u16;
    fn configure_output(&mut self);
    fn write(&mut self, high: bool);
    fn read(&self) -> bool;
}

pub trait PwmOutput: Send {
    fn number(&self) -> u16;
    fn attach(&mut self);
    fn write_pulse_us(&mut self, pulse_us: u16);
}

pub trait SensorProbe: Send {
    fn number(&self) -> u16;
    fn begin(&mut self);
    /// One reading in tenths of the probe's unit (e.g. 0.1 °C).
    fn read(&mut self) -> Result<i32, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe did not answer")]
    Timeout,
    #[error("probe checksum mismatch")]
    Checksum,
}

#[derive(Debug, Default)]
struct PinCell {
    level: AtomicBool,
    output: AtomicBool,
    writes: AtomicU32,
}

#[derive(Debug, Clone)]
pub struct SimulatedPin {
    number: u16,
    cell: Arc<PinCell>,
}

impl SimulatedPin {
    pub fn new(number: u16) -> Self {
        Self {
            number,
            cell: Arc::new(PinCell::default()),
        }
    }

    pub fn is_output(&self) -> bool {
        self.cell.output.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> u32 {
        self.cell.writes.load(Ordering::SeqCst)
    }

    /// Drives the line from outside, as wiring or a stuck relay would.
    pub fn force_level(&self, high: bool) {
        self.cell.level.store(high, Ordering::SeqCst);
    }
}

impl DigitalPin for SimulatedPin {
    fn number(&self) -> u16 {
        self.number
    }

    fn configure_output(&mut self) {
        self.cell.output.store(true, Ordering::SeqCst);
    }

    fn write(&mut self, high: bool) {
        self.cell.level.store(high, Ordering::SeqCst);
        self.cell.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn read(&self) -> bool {
        self.cell.level.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct PwmCell {
    attached: AtomicBool,
    pulse_us: AtomicU16,
}

#[derive(Debug, Clone)]
pub struct SimulatedPwm {
    number: u16,
    cell: Arc<PwmCell>,
}

impl SimulatedPwm {
    pub fn new(number: u16) -> Self {
        Self {
            number,
            cell: Arc::new(PwmCell::default()),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.cell.attached.load(Ordering::SeqCst)
    }

    /// Last pulse width written, `0` if nothing was written yet.
    pub fn pulse_us(&self) -> u16 {
        self.cell.pulse_us.load(Ordering::SeqCst)
    }
}

impl PwmOutput for SimulatedPwm {
    fn number(&self) -> u16 {
        self.number
    }

    fn attach(&mut self) {
        self.cell.attached.store(true, Ordering::SeqCst);
    }

    fn write_pulse_us(&mut self, pulse_us: u16) {
        self.cell.pulse_us.store(pulse_us, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ProbeCell {
    started: AtomicBool,
    reading: AtomicI32,
    failing: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct SimulatedProbe {
    number: u16,
    cell: Arc<ProbeCell>,
}

impl SimulatedProbe {
    pub fn new(number: u16, reading: i32) -> Self {
        let cell = ProbeCell::default();
        cell.reading.store(reading, Ordering::SeqCst);
        Self {
            number,
            cell: Arc::new(cell),
        }
    }

    pub fn is_started(&self) -> bool {
        self.cell.started.load(Ordering::SeqCst)
    }

    pub fn set_reading(&self, reading: i32) {
        self.cell.reading.store(reading, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.cell.failing.store(failing, Ordering::SeqCst);
    }
}

impl SensorProbe for SimulatedProbe {
    fn number(&self) -> u16 {
        self.number
    }

    fn begin(&mut self) {
        self.cell.started.store(true, Ordering::SeqCst);
    }

    fn read(&mut self) -> Result<i32, ProbeError> {
        if self.cell.failing.load(Ordering::SeqCst) {
            return Err(ProbeError::Timeout);
        }
        Ok(self.cell.reading.load(Ordering::SeqCst))
    }
}
