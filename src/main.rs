//! Accelerometer Data Collector CLI
//!
//! Streams samples from a serial accelerometer board and saves each run as CSV.

use accel_data_collector::{
    config::Config,
    core::{establish, ConnectOutcome, ExportOutcome, Exporter, PauseReport, Session, StartOutcome},
    link::{list_available_ports, LinkSettings, SerialLink},
    prompt::{Console, ConsoleInput, InputPoll, PortEnumerator, PortSelector, SystemPorts},
    stats::{create_shared_stats_with_persistence, PersistedStats, SharedStats},
    COMMAND_HELP, VERSION,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "accel-collector")]
#[command(version = VERSION)]
#[command(about = "Collect serial accelerometer samples into CSV files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the device and collect data interactively
    Collect {
        /// Serial port to use instead of choosing from a list
        #[arg(long, short)]
        port: Option<String>,

        /// Directory for CSV files
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List available serial ports
    Ports,
    /// Show cumulative collection statistics
    Status,
    /// Show configuration
    Config,
}

/// A line typed at the `collect` prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplCommand {
    Start,
    Pause,
    Status,
    Reconnect,
    Help,
    Quit,
}

impl ReplCommand {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Some(Self::Start),
            "pause" | "p" => Some(Self::Pause),
            "status" => Some(Self::Status),
            "reconnect" => Some(Self::Reconnect),
            "help" | "?" => Some(Self::Help),
            "quit" | "q" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// A port named on the command line. It is offered even when the system
/// does not enumerate it, e.g. a pseudo-terminal.
#[derive(Clone)]
struct RequestedPort(String);

impl PortEnumerator for RequestedPort {
    fn list_available_ports(&self) -> Vec<String> {
        vec![self.0.clone()]
    }
}

impl PortSelector for RequestedPort {
    fn select_port(&mut self, _ports: &[String]) -> Option<String> {
        Some(self.0.clone())
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Collect { port, output } => cmd_collect(port, output),
        Commands::Ports => cmd_ports(),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("accel_data_collector=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_collect(port: Option<String>, output: Option<PathBuf>) -> Result<()> {
    println!("Accelerometer Data Collector v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Could not load configuration, using defaults: {e}");
        Config::default()
    });
    if let Some(dir) = output {
        config.output_dir = dir;
    }
    if let Err(e) = config.ensure_directories() {
        warn!("Could not create directories: {e}");
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let mut console = Console::new(ConsoleInput::spawn(running.clone()));
    console.set_preferred_port(config.last_port.clone());

    let settings = config.link_settings();
    let Some(link) = connect(&mut console, port.as_deref(), &settings) else {
        println!("No device connected.");
        return Ok(());
    };
    let mut session = new_session(link, &config, &stats);

    println!();
    println!("Connected to {}", session.port_name());
    println!("Saving to {:?}", config.output_dir);
    println!("{COMMAND_HELP}");

    let mut reader_notice_shown = false;

    while running.load(Ordering::SeqCst) {
        if session.reader_finished() && !reader_notice_shown {
            println!("The reader stopped after a read error. Pause to save the samples.");
            reader_notice_shown = true;
        }

        let line = match console.input().poll(POLL_INTERVAL) {
            InputPoll::Line(line) => line,
            InputPoll::Idle => continue,
            InputPoll::Closed => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let Some(command) = ReplCommand::parse(&line) else {
            println!("Unknown command: {}. Type 'help' for a list.", line.trim());
            continue;
        };

        match command {
            ReplCommand::Start => match session.start() {
                Ok(StartOutcome::Started) => {
                    reader_notice_shown = false;
                    println!("Collecting... type 'pause' to stop and save.");
                }
                Ok(StartOutcome::AlreadyCollecting) => println!("Already collecting."),
                Err(e) => eprintln!("Error starting collection: {e}"),
            },
            ReplCommand::Pause => match session.pause(&mut console) {
                Some(report) => print_pause_report(&report),
                None => println!("Not collecting."),
            },
            ReplCommand::Status => {
                let collected = session.snapshot().len();
                println!("Port: {}", session.port_name());
                println!("State: {:?}", session.state());
                println!("Samples in current run: {collected}");
                println!("{}", session.stats().summary());
            }
            ReplCommand::Reconnect => {
                session.shutdown();
                match connect(&mut console, port.as_deref(), &settings) {
                    Some(link) => {
                        session = new_session(link, &config, &stats);
                        println!("Connected to {}", session.port_name());
                    }
                    None => {
                        println!("No device connected.");
                        break;
                    }
                }
            }
            ReplCommand::Help => println!("{COMMAND_HELP}"),
            ReplCommand::Quit => break,
        }
    }

    println!();
    println!("Shutting down...");
    session.shutdown();

    println!();
    println!("{}", stats.summary());
    if let Err(e) = stats.save() {
        warn!("Could not save statistics: {e}");
    }

    Ok(())
}

/// Run the connection workflow and remember the chosen port.
fn connect(
    console: &mut Console,
    requested: Option<&str>,
    settings: &LinkSettings,
) -> Option<SerialLink> {
    let open = |port: &str| {
        println!("Connecting to {port}...");
        SerialLink::open(port, settings)
    };
    let mut retry = console.clone();

    let outcome = match requested {
        Some(port) => {
            let mut requested = RequestedPort(port.to_string());
            let ports = requested.clone();
            establish(&ports, &mut requested, &mut retry, open)
        }
        None => establish(&SystemPorts, console, &mut retry, open),
    };

    match outcome {
        ConnectOutcome::Connected(link) => {
            remember_port(link.port_name());
            console.set_preferred_port(Some(link.port_name().to_string()));
            Some(link)
        }
        ConnectOutcome::NoPort => None,
        ConnectOutcome::GaveUp(e) => {
            eprintln!("Could not connect: {e}");
            None
        }
    }
}

fn new_session(link: SerialLink, config: &Config, stats: &SharedStats) -> Session {
    Session::new(link, Exporter::new(&config.output_dir))
        .with_stats(stats.clone())
        .with_default_base_name(config.default_base_name.clone())
}

/// Store the last used port without persisting command-line overrides.
fn remember_port(port: &str) {
    let mut saved = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Not saving last port, configuration unreadable: {e}");
            return;
        }
    };
    if saved.last_port.as_deref() == Some(port) {
        return;
    }
    saved.last_port = Some(port.to_string());
    match saved.save() {
        Ok(()) => info!(port, "Saved last used port"),
        Err(e) => warn!("Could not save configuration: {e}"),
    }
}

fn print_pause_report(report: &PauseReport) {
    if let Err(e) = &report.stop_command {
        eprintln!("Warning: {e}");
    }
    match &report.export {
        ExportOutcome::Written { path, rows } => {
            println!("Saved {rows} samples to {}", path.display());
        }
        ExportOutcome::Skipped => println!("Discarded {} samples.", report.samples),
        ExportOutcome::Failed(e) => eprintln!("Error saving data: {e}"),
    }
}

fn cmd_ports() -> Result<()> {
    let ports = list_available_ports().context("Could not enumerate serial ports")?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {port}");
        }
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = Config::load().context("Could not load configuration")?;

    println!("Accelerometer Data Collector Status");
    println!("===================================");
    println!();
    println!("Configuration:");
    println!("  Output directory: {:?}", config.output_dir);
    println!(
        "  Last port: {}",
        config.last_port.as_deref().unwrap_or("(none)")
    );
    println!("  Read timeout: {}ms", config.read_timeout.as_millis());
    println!();

    let stats_path = config.stats_path();
    if !stats_path.exists() {
        println!("No previous session data found.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&stats_path)
        .with_context(|| format!("Could not read {stats_path:?}"))?;
    let stats: PersistedStats = serde_json::from_str(&content)
        .with_context(|| format!("Could not parse {stats_path:?}"))?;

    println!("Cumulative Statistics:");
    println!("  Samples recorded: {}", stats.samples_recorded);
    println!("  Skipped reads: {}", stats.read_errors);
    println!("  Runs completed: {}", stats.runs_completed);
    println!(
        "  Files exported: {} ({} rows)",
        stats.files_exported, stats.rows_exported
    );
    println!(
        "  Last updated: {}",
        stats.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().context("Could not load configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
