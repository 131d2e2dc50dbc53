use clap::{App, Arg};
use ctrlbus::agent::ControllerAgent;
use ctrlbus::clock::MonotonicClock;
use ctrlbus::config::ControllerConfig;
use ctrlbus::startup::StdDelay;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{error, info, warn};

const DEFAULT_TCP_PORT: &str = "8080";
const DEFAULT_LOOP_PERIOD_MS: &str = "10";
const OUTPUT_BROADCAST_BUFFER_SIZE: usize = 256;
const READ_CHUNK_SIZE: usize = 256;

type SharedAgent = Arc<Mutex<ControllerAgent>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("ctrlbus-controller")
        .version("0.1.0")
        .about("Runs the device controller loop, serving the serial protocol over TCP")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON controller configuration (defaults to the built-in scope controller)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port standing in for the serial line")
                .takes_value(true)
                .default_value(DEFAULT_TCP_PORT),
        )
        .arg(
            Arg::with_name("name")
                .long("name")
                .value_name("NAME")
                .help("Override the controller name reported in status lines")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval")
                .value_name("MS")
                .help("Override the status report interval")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Interval must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("loop-period")
                .long("loop-period")
                .value_name("MS")
                .help("Main loop iteration period")
                .takes_value(true)
                .default_value(DEFAULT_LOOP_PERIOD_MS)
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Loop period must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("headless")
                .long("headless")
                .help("Signal start-up as if no console were attached"),
        )
        .arg(
            Arg::with_name("stdin")
                .long("stdin")
                .help("Also read commands from stdin and echo output to stdout"),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(name) = matches.value_of("name") {
        config.name = name.to_string();
    }
    if let Some(interval) = matches.value_of("interval") {
        config.report_interval_ms = interval.parse()?;
    }
    if matches.is_present("headless") {
        config.console_attached = false;
    }
    let tcp_port = matches.value_of("port").unwrap_or(DEFAULT_TCP_PORT).parse::<u16>()?;
    let loop_period = matches
        .value_of("loop-period")
        .unwrap_or(DEFAULT_LOOP_PERIOD_MS)
        .parse::<u64>()?;
    let echo_stdout = matches.is_present("stdin");

    let (mut agent, _board) = ControllerAgent::simulated(
        &config,
        Box::new(MonotonicClock::new()),
        Box::new(StdDelay),
    )?;
    info!(controller = %config.name, devices = config.devices.len(), "initializing devices");
    tokio::task::block_in_place(|| agent.setup());

    let agent: SharedAgent = Arc::new(Mutex::new(agent));
    let (output_tx, _) = broadcast::channel(OUTPUT_BROADCAST_BUFFER_SIZE);

    let tcp_agent = Arc::clone(&agent);
    let tcp_output_tx = output_tx.clone();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(tcp_port, tcp_agent, tcp_output_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    let stdin_reader = if echo_stdout {
        let stdin_agent = Arc::clone(&agent);
        Some(tokio::spawn(async move {
            if let Err(e) = forward_input(tokio::io::stdin(), stdin_agent).await {
                warn!("stdin reader stopped: {}", e);
            }
        }))
    } else {
        None
    };

    let mut interval = time::interval(Duration::from_millis(loop_period));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }

        let lines = {
            let mut agent_guard = agent.lock().await;
            agent_guard.run_once();
            agent_guard.port_mut().take_output()
        };

        for line in lines {
            if echo_stdout {
                println!("{}", line);
            }
            // No subscribers is fine; the line is simply not delivered.
            let _ = output_tx.send(line);
        }
    }

    {
        let mut agent_guard = agent.lock().await;
        agent_guard.stop();
        let stats = agent_guard.get_stats();
        info!(
            reports = stats.reports_emitted,
            commands = stats.commands_dispatched,
            unknown = stats.unknown_device_count,
            "controller stopped"
        );
    }

    tcp_server.abort();
    if let Some(reader) = stdin_reader {
        reader.abort();
    }

    Ok(())
}

async fn start_tcp_server(
    port: u16,
    agent: SharedAgent,
    output_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("serial bridge listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("client connected: {}", addr);
                let client_agent = Arc::clone(&agent);
                let client_output_rx = output_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_agent, client_output_rx).await {
                        warn!("client {} error: {}", addr, e);
                    }
                    info!("client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    agent: SharedAgent,
    mut output_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();

    let output_task = tokio::spawn(async move {
        loop {
            match output_rx.recv().await {
                Ok(line) => {
                    if writer.write_all(line.as_bytes()).await.is_err()
                        || writer.write_all(b"\n").await.is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("client lagging, skipped {} lines", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let result = forward_input(reader, agent).await;
    output_task.abort();
    result
}

/// Copies raw bytes into the controller's receive buffer until EOF.
async fn forward_input<R>(mut reader: R, agent: SharedAgent) -> Result<(), Box<dyn std::error::Error>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        let mut agent_guard = agent.lock().await;
        let accepted = agent_guard.port_mut().receive(&buffer[..n]);
        if accepted < n {
            warn!("receive buffer full, dropped {} bytes", n - accepted);
        }
    }
}
