use crate::clock::Clock;
use crate::config::{ConfigError, ControllerConfig};
use crate::devices::{self, Actuation, SimulatedBoard};
use crate::protocol::{Command, CommandParser, ParserStats};
use crate::registry::{DeviceRegistry, DispatchError, RegistryError};
use crate::scheduler::{ReportScheduler, SchedulerStats};
use crate::serial::{LoopbackPort, SerialPort};
use crate::startup::{self, Delay, StartupNotifier};
use crate::telemetry::{self, StatusReport};
use arrayvec::ArrayString;
use core::fmt::Write;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SETUP_COMPLETE_LINE: &str = "EXIT setup()";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentState {
    pub running: bool,
    pub setup_complete_ms: Option<u64>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControllerStats {
    pub loop_iterations: u64,
    pub commands_dispatched: u32,
    pub commands_clamped: u32,
    pub unknown_device_count: u32,
    pub reports_emitted: u32,
    pub report_errors: u32,
}

/// What one main-loop iteration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Iteration {
    pub report: Option<StatusReport>,
    pub commands: u32,
}

/// The controller context: registry, parser, scheduler and serial port,
/// owned together and driven one iteration at a time.
///
/// ```rust
/// use ctrlbus::agent::ControllerAgent;
/// use ctrlbus::clock::ManualClock;
/// use ctrlbus::config::ControllerConfig;
/// use ctrlbus::startup::NoDelay;
///
/// let clock = ManualClock::new(0);
/// let (mut agent, _board) = ControllerAgent::simulated(
///     &ControllerConfig::default(),
///     Box::new(clock.clone()),
///     Box::new(NoDelay::default()),
/// ).unwrap();
///
/// agent.setup();
/// agent.port_mut().receive(b"13,1\n");
/// assert_eq!(agent.run_once().commands, 1);
///
/// clock.advance(1000);
/// assert!(agent.run_once().report.is_some());
/// ```
pub struct ControllerAgent<P: SerialPort = LoopbackPort> {
    name: String,
    console_attached: bool,
    registry: DeviceRegistry,
    parser: CommandParser,
    scheduler: ReportScheduler,
    port: P,
    clock: Box<dyn Clock + Send>,
    notifier: Box<dyn StartupNotifier>,
    state: AgentState,
    stats: ControllerStats,
    last_report: Option<StatusReport>,
}

impl ControllerAgent<LoopbackPort> {
    /// Builds an agent over simulated hardware and an in-memory port.
    pub fn simulated(
        config: &ControllerConfig,
        clock: Box<dyn Clock + Send>,
        delay: Box<dyn Delay>,
    ) -> Result<(Self, SimulatedBoard), AgentError> {
        config.validate()?;
        let (registry, board) = devices::build_simulated(&config.devices)?;
        let notifier = startup::notifier_for(config.startup, delay);
        let agent = Self::new(config, registry, LoopbackPort::new(), clock, notifier)?;
        Ok((agent, board))
    }
}

impl<P: SerialPort> ControllerAgent<P> {
    pub fn new(
        config: &ControllerConfig,
        registry: DeviceRegistry,
        port: P,
        clock: Box<dyn Clock + Send>,
        notifier: Box<dyn StartupNotifier>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let now = clock.now_ms();

        Ok(Self {
            name: config.name.clone(),
            console_attached: config.console_attached,
            registry,
            parser: CommandParser::with_token_limit(config.max_token_len),
            scheduler: ReportScheduler::new(config.report_interval_ms, now),
            port,
            clock,
            notifier,
            state: AgentState::default(),
            stats: ControllerStats::default(),
            last_report: None,
        })
    }

    /// Initializes every device, runs the start-up signal and starts the
    /// report schedule from the moment set-up ends.
    pub fn setup(&mut self) {
        for device in self.registry.devices_mut() {
            device.init();
        }
        self.notifier.notify(&mut self.registry, self.console_attached);

        let now = self.clock.now_ms();
        self.scheduler.rebase(now);
        self.state.setup_complete_ms = Some(now);
        self.state.running = true;
        self.port.write_line(SETUP_COMPLETE_LINE);

        info!(
            controller = %self.name,
            devices = self.registry.len(),
            interval_ms = self.scheduler.interval_ms(),
            "controller set up"
        );
    }

    pub fn stop(&mut self) {
        self.state.running = false;
        info!(controller = %self.name, "controller stopping");
    }

    /// One main-loop iteration: at most one report pass, device ticks, then
    /// every buffered input byte.
    pub fn run_once(&mut self) -> Iteration {
        let mut iteration = Iteration::default();
        if !self.state.running {
            return iteration;
        }

        let now = self.clock.now_ms();
        self.state.uptime_seconds = now.saturating_sub(self.scheduler.start_ms()) / 1000;

        if let Some(tick) = self.scheduler.maybe_report(now) {
            let report = telemetry::report_pass(&self.name, tick, &mut self.registry);
            match report.to_line() {
                Ok(line) => {
                    self.port.write_line(&line);
                    self.stats.reports_emitted += 1;
                }
                Err(e) => {
                    warn!(error = %e, counter = tick.counter, "status report not emitted");
                    self.stats.report_errors += 1;
                }
            }
            self.last_report = Some(report.clone());
            iteration.report = Some(report);
        }

        for device in self.registry.devices_mut() {
            device.tick(now);
        }

        loop {
            match self.port.read() {
                Ok(byte) => {
                    if let Some(command) = self.parser.push(byte) {
                        self.dispatch(command);
                        iteration.commands += 1;
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    warn!(error = ?e, "serial read failed");
                    break;
                }
            }
        }

        self.stats.loop_iterations += 1;
        iteration
    }

    /// Applies one command. Unknown ids produce a diagnostic line on the port.
    pub fn dispatch(&mut self, command: Command) {
        match self.registry.dispatch(command.device_id, command.value) {
            Ok(actuation) => {
                self.stats.commands_dispatched += 1;
                if let Actuation::Clamped(applied) = actuation {
                    self.stats.commands_clamped += 1;
                    debug!(
                        device = %command.device_id,
                        requested = command.value,
                        applied,
                        "value clamped by device"
                    );
                }
            }
            Err(e @ DispatchError::UnknownDevice(id)) => {
                self.stats.unknown_device_count += 1;
                warn!(device = %id, value = command.value, "command for unknown device");

                let mut line = ArrayString::<64>::new();
                if write!(line, "{}", e).is_ok() {
                    self.port.write_line(&line);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_state(&self) -> &AgentState {
        &self.state
    }

    pub fn get_stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn get_parser_stats(&self) -> &ParserStats {
        self.parser.get_stats()
    }

    pub fn get_scheduler_stats(&self) -> &SchedulerStats {
        self.scheduler.get_stats()
    }

    pub fn next_report_ms(&self) -> u64 {
        self.scheduler.next_deadline_ms()
    }

    pub fn last_report(&self) -> Option<&StatusReport> {
        self.last_report.as_ref()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
