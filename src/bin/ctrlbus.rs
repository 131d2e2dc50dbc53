use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use ctrlbus::protocol::Command as ControlCommand;
use ctrlbus::telemetry::{board_name, StatusReport};
use std::process::Command;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
// Twice the default report interval, so a whole status line can arrive.
const READ_TIMEOUT: Duration = Duration::from_secs(4);
const DIAGNOSTIC_WAIT: Duration = Duration::from_millis(300);
const DETECT_RETRY_LIMIT: usize = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("ctrlbus")
        .version("0.1.0")
        .about("🔭 Device controller client - send commands and watch status reports")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Controller host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Controller port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("set")
                .about("⚙️  Send a raw <id>,<value> command")
                .arg(
                    Arg::with_name("id")
                        .help("Device id (pin number)")
                        .required(true)
                        .validator(validate_u16),
                )
                .arg(
                    Arg::with_name("value")
                        .help("Value to apply")
                        .required(true)
                        .validator(validate_u32),
                ),
        )
        .subcommand(
            SubCommand::with_name("relay")
                .about("🔌 Switch a relay or LED")
                .arg(
                    Arg::with_name("id")
                        .help("Device id (pin number)")
                        .required(true)
                        .validator(validate_u16),
                )
                .arg(
                    Arg::with_name("state")
                        .help("Relay state")
                        .required(true)
                        .possible_values(&["on", "off", "enable", "disable"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("servo")
                .about("🎚️  Move a servo")
                .arg(
                    Arg::with_name("id")
                        .help("Device id (pin number)")
                        .required(true)
                        .validator(validate_u16),
                )
                .arg(
                    Arg::with_name("angle")
                        .help("Angle in degrees (0-180)")
                        .required(true)
                        .validator(|v| match v.parse::<u32>() {
                            Ok(angle) if angle <= 180 => Ok(()),
                            _ => Err("Angle must be between 0 and 180".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Monitor the status report stream")
                .arg(
                    Arg::with_name("board")
                        .short("b")
                        .long("board")
                        .value_name("NAME")
                        .help("Expected board name; stop if a different board reports")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("REPORTS")
                        .help("Stop after this many reports (default: infinite)")
                        .takes_value(true)
                        .validator(validate_u32),
                ),
        )
        .subcommand(SubCommand::with_name("detect").about("🔍 Print the name of the board on the port"))
        .subcommand(
            SubCommand::with_name("server")
                .about("🚀 Start the controller")
                .arg(
                    Arg::with_name("background")
                        .short("b")
                        .long("background")
                        .help("Run controller in background"),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    if verbose {
        println!("{}", "🔭 ctrlbus - Device Controller".bright_blue().bold());
        println!("{} {}:{}", "Connecting to".dimmed(), host, port);
    }

    match matches.subcommand() {
        ("set", Some(sub_matches)) => {
            let command = ControlCommand::new(arg_u16(sub_matches, "id")?, arg_u32(sub_matches, "value")?);
            handle_command(host, port, format, command, "Device").await?;
        }
        ("relay", Some(sub_matches)) => {
            let on = normalize_state(sub_matches.value_of("state").unwrap_or("off"));
            let command = ControlCommand::new(arg_u16(sub_matches, "id")?, u32::from(on));
            handle_command(host, port, format, command, "Relay").await?;
        }
        ("servo", Some(sub_matches)) => {
            let command = ControlCommand::new(arg_u16(sub_matches, "id")?, arg_u32(sub_matches, "angle")?);
            handle_command(host, port, format, command, "Servo").await?;
        }
        ("monitor", Some(sub_matches)) => {
            let board = sub_matches.value_of("board");
            let count = sub_matches.value_of("count").map(str::parse::<u32>).transpose()?;
            handle_monitor(host, port, format, board, count).await?;
        }
        ("detect", _) => {
            handle_detect(host, port, format).await?;
        }
        ("server", Some(sub_matches)) => {
            handle_server(sub_matches, port)?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start the controller", "ctrlbus server".bright_cyan());
            println!("  {} Watch status reports", "ctrlbus monitor".bright_cyan());
            println!("  {} Switch relay 11 on", "ctrlbus relay 11 on".bright_cyan());
        }
    }

    Ok(())
}

fn validate_u16(v: String) -> Result<(), String> {
    v.parse::<u16>().map(|_| ()).map_err(|_| "Must be a number between 0 and 65535".into())
}

fn validate_u32(v: String) -> Result<(), String> {
    v.parse::<u32>().map(|_| ()).map_err(|_| "Must be a non-negative number".into())
}

fn arg_u16(matches: &ArgMatches<'_>, name: &str) -> Result<u16, Box<dyn std::error::Error>> {
    Ok(matches.value_of(name).ok_or("missing argument")?.parse()?)
}

fn arg_u32(matches: &ArgMatches<'_>, name: &str) -> Result<u32, Box<dyn std::error::Error>> {
    Ok(matches.value_of(name).ok_or("missing argument")?.parse()?)
}

fn normalize_state(state: &str) -> bool {
    matches!(state, "on" | "enable")
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to controller at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Controller is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "ctrlbus server".bright_cyan());
                eprintln!("   or");
                eprintln!("   {}", "cargo run --bin ctrlbus-controller".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            Err(e.into())
        }
    }
}

/// Writes one command line, then listens briefly for a diagnostic answer.
///
/// The protocol never acknowledges accepted commands, so silence means the
/// line was delivered, not that the device acted on it.
async fn send_command(
    host: &str,
    port: u16,
    command: ControlCommand,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let stream = connect(host, port).await?;
    let (reader, mut writer) = stream.into_split();
    writer.write_all(command.to_line().as_bytes()).await?;

    let mut lines = BufReader::new(reader).lines();
    let deadline = tokio::time::Instant::now() + DIAGNOSTIC_WAIT;
    loop {
        match tokio::time::timeout_at(deadline, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if line.starts_with("Invalid device id") {
                    return Ok(Some(line));
                }
            }
            Ok(Ok(None)) | Err(_) => return Ok(None),
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

async fn handle_command(
    host: &str,
    port: u16,
    format: &str,
    command: ControlCommand,
    action: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let diagnostic = send_command(host, port, command).await?;

    match format {
        "json" => {
            let result = serde_json::json!({
                "device_id": command.device_id,
                "value": command.value,
                "diagnostic": diagnostic,
            });
            println!("{}", result);
        }
        "compact" => match diagnostic {
            Some(_) => println!("{}", "UNKNOWN".bright_red()),
            None => println!("{}", "SENT".bright_green()),
        },
        _ => match diagnostic {
            Some(message) => {
                println!("{} {} {}: {}", "❌".red(), action.bright_white(), command.device_id, message.bright_red());
                println!("{} Run {} to list the registered devices", "💡".yellow(), "ctrlbus monitor -n 1".bright_cyan());
            }
            None => {
                println!(
                    "{} {} {} set to {}",
                    "✅".green(),
                    action.bright_white(),
                    command.device_id.to_string().bright_white(),
                    command.value.to_string().bright_cyan()
                );
            }
        },
    }

    Ok(())
}

async fn handle_monitor(
    host: &str,
    port: u16,
    format: &str,
    board: Option<&str>,
    count: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let stream = connect(host, port).await?;
    let mut lines = BufReader::new(stream).lines();
    let mut seen = 0u32;

    if format == "table" {
        println!("{}", "📡 Monitoring controller status (Press Ctrl+C to stop)...".bright_blue().bold());
    }

    while let Some(line) = lines.next_line().await? {
        let report = match StatusReport::parse(&line) {
            Ok(report) => report,
            Err(_) => {
                if format != "json" {
                    println!("{} {}", "»".dimmed(), line.dimmed());
                }
                continue;
            }
        };

        if let Some(expected) = board {
            if report.name != expected {
                eprintln!(
                    "{} Board reports name {}, expected {}",
                    "🚨".red(),
                    report.name.bright_red(),
                    expected.bright_white()
                );
                return Err("board name mismatch".into());
            }
        }

        match format {
            "json" => println!("{}", line),
            "compact" => print_report_compact(&report),
            _ => print_report_table(&report),
        }

        seen += 1;
        if count.map_or(false, |limit| seen >= limit) {
            break;
        }
    }

    Ok(())
}

async fn handle_detect(host: &str, port: u16, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stream = connect(host, port).await?;
    let mut lines = BufReader::new(stream).lines();

    for _ in 0..DETECT_RETRY_LIMIT {
        let line = match tokio::time::timeout(READ_TIMEOUT, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => continue,
        };
        if let Some(name) = board_name(&line) {
            match format {
                "json" => println!("{}", serde_json::json!({ "board": name, "port": port })),
                "compact" => println!("{}", name),
                _ => println!("{} Found board {} on port {}", "✅".green(), name.bright_cyan(), port),
            }
            return Ok(());
        }
    }

    eprintln!("{} No board name found after {} lines", "❓".blue(), DETECT_RETRY_LIMIT);
    Err("board not detected".into())
}

fn handle_server(matches: &ArgMatches<'_>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let background = matches.is_present("background");
    let port = port.to_string();

    println!("{}", "🚀 Starting device controller...".bright_green().bold());

    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--bin", "ctrlbus-controller", "--", "--port", port.as_str()]);

    if background {
        cmd.spawn()?;
        println!("{} Controller started in background on port {}", "✅".green(), port);
    } else {
        println!("{} Controller starting on port {} (Press Ctrl+C to stop)", "🌐".bright_blue(), port);
        cmd.status()?;
    }

    Ok(())
}

fn print_report_table(report: &StatusReport) {
    println!(
        "{} {} {} {} {} {}",
        "┌".bright_white(),
        report.name.bright_blue().bold(),
        "uptime".dimmed(),
        report.uptime.bright_white(),
        "report".dimmed(),
        report.num.bright_white()
    );
    for device in &report.devices {
        println!(
            "{} {:<16} pin {:>3}  value {}",
            "│".bright_white(),
            device.name,
            device.pin_number,
            device.pin_value.bright_cyan()
        );
    }
    println!("{}", "└".bright_white());
}

fn print_report_compact(report: &StatusReport) {
    let values: Vec<String> = report
        .devices
        .iter()
        .map(|d| format!("{}={}", d.name, d.pin_value))
        .collect();
    println!("[{}] #{} {} | {}", report.uptime, report.num, report.name.green(), values.join(" "));
}
