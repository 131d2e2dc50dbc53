//! Serial port abstraction.
//!
//! Reads are non-blocking in the `nb` style: the control loop drains bytes
//! until the port answers `WouldBlock`, then goes back to scheduling.

use core::convert::Infallible;
use heapless::spsc::Queue;

/// Receive buffer size; the usable capacity is one less.
pub const RX_BUFFER_SIZE: usize = 1024;

pub trait SerialPort {
    type Error: core::fmt::Debug;

    fn read(&mut self) -> nb::Result<u8, Self::Error>;

    /// Writes `line` followed by a line terminator.
    fn write_line(&mut self, line: &str);
}

/// In-memory port: bytes pushed with [`LoopbackPort::receive`] are read by the
/// controller, lines it writes are collected for [`LoopbackPort::take_output`].
#[derive(Debug)]
pub struct LoopbackPort {
    rx: Queue<u8, RX_BUFFER_SIZE>,
    tx: alloc::vec::Vec<alloc::string::String>,
    overrun_bytes: u32,
}

impl LoopbackPort {
    pub fn new() -> Self {
        Self {
            rx: Queue::new(),
            tx: alloc::vec::Vec::new(),
            overrun_bytes: 0,
        }
    }

    /// Queues incoming bytes. Bytes that do not fit are lost, as on a UART
    /// overrun; returns how many were accepted.
    pub fn receive(&mut self, bytes: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in bytes {
            if self.rx.enqueue(byte).is_err() {
                self.overrun_bytes = self.overrun_bytes.saturating_add(1);
            } else {
                accepted += 1;
            }
        }
        accepted
    }

    pub fn pending_input(&self) -> usize {
        self.rx.len()
    }

    pub fn overrun_bytes(&self) -> u32 {
        self.overrun_bytes
    }

    pub fn take_output(&mut self) -> alloc::vec::Vec<alloc::string::String> {
        core::mem::take(&mut self.tx)
    }
}

impl Default for LoopbackPort {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialPort for LoopbackPort {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.rx.dequeue().ok_or(nb::Error::WouldBlock)
    }

    fn write_line(&mut self, line: &str) {
        self.tx.push(alloc::string::ToString::to_string(line));
    }
}
