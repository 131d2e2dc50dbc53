//! # Device Controller Loop
//!
//! An embedded-style control loop that drives a fixed set of devices (LEDs,
//! relays, servos, temperature probes) from a line-based serial protocol and
//! reports their state as one JSON status line per interval.
//!
//! ## Features
//!
//! - **Serial command protocol**: `<deviceId>,<value>\n`, parsed byte by byte
//!   by a bounded state machine; malformed lines are dropped silently
//! - **Device registry**: insertion-ordered, fixed capacity, explicit failure
//!   for unknown ids
//! - **Status reports**: wall-clock scheduling with deadline clamping, so a
//!   stalled loop never produces a burst of catch-up reports
//! - **Start-up signalling**: configurable blink/banner/silent strategies
//! - **Embedded-friendly**: bounded buffers, non-blocking `nb` serial reads,
//!   nothing in the loop is fatal
//!
//! ## Quick Start
//!
//! ```rust
//! use ctrlbus::agent::ControllerAgent;
//! use ctrlbus::clock::MonotonicClock;
//! use ctrlbus::config::ControllerConfig;
//! use ctrlbus::startup::NoDelay;
//!
//! let (mut agent, _board) = ControllerAgent::simulated(
//!     &ControllerConfig::default(),
//!     Box::new(MonotonicClock::new()),
//!     Box::new(NoDelay::default()),
//! ).unwrap();
//!
//! agent.setup();
//! agent.port_mut().receive(b"11,1\n");
//! agent.run_once();
//!
//! for line in agent.port_mut().take_output() {
//!     println!("{}", line);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`agent`] - Controller context and main-loop iteration
//! - [`protocol`] - Serial command parser
//! - [`registry`] - Device registry and dispatch
//! - [`scheduler`] - Status report scheduling
//! - [`telemetry`] - Status line serialization
//! - [`devices`] - Device capability trait and drivers
//! - [`hal`] - Hardware ports and their simulated implementations
//! - [`serial`] - Non-blocking serial port abstraction
//! - [`startup`] - Start-up notification strategies
//! - [`config`] - Controller configuration

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;

pub mod agent;
pub mod clock;
pub mod config;
pub mod devices;
pub mod hal;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod serial;
pub mod startup;
pub mod telemetry;

// Re-export main public types for convenience
pub use agent::ControllerAgent;
pub use config::ControllerConfig;
pub use devices::{Device, DeviceId};
pub use protocol::{Command, CommandParser};
pub use registry::DeviceRegistry;
pub use scheduler::ReportScheduler;
pub use telemetry::{DeviceFragment, StatusReport};
