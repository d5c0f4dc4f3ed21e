//! Sarathi vehicle runtime
//!
//! - `sarathi run` (default): start the pipeline and the TCP control server
//! - `sarathi self-test`: pulse each motor side and exit

use clap::{Parser, Subcommand};
use sarathi::control::{ControlServer, PendingRequest};
use sarathi::core::{CancelToken, Channel};
use sarathi::devices::create_devices;
use sarathi::diagnostics::motor_self_test;
use sarathi::{Config, Error, Result, Supervisor};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/sarathi.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults apply if the default path is absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the vehicle pipeline and control server
    Run,
    /// Pulse each motor side forward, stop, backward
    SelfTest {
        /// Time spent in each step (ms)
        #[arg(long, default_value = "500")]
        dwell_ms: u64,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Config::load(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn run(config: Config) -> Result<()> {
    let devices = create_devices(&config)?;
    let mut supervisor = Supervisor::start(config.clone(), devices)?;

    let requests: Channel<PendingRequest> = Channel::new();
    let mut server = ControlServer::start(&config.control, requests.clone())?;

    let stop = CancelToken::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        handler_stop.cancel();
    })
    .map_err(|e| Error::Io(io::Error::other(format!("Error setting Ctrl-C handler: {}", e))))?;

    supervisor.run(&requests, &stop);

    server.shutdown();
    supervisor.shutdown();
    log::info!("Sarathi stopped");
    Ok(())
}

fn self_test(config: Config, dwell: Duration) -> Result<()> {
    let mut devices = create_devices(&config)?;
    motor_self_test(devices.gpio.as_mut(), &config.drive, dwell)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    sarathi::logging::init(&config.logging)?;

    log::info!("Sarathi v{} starting", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Device: {} | control: {} | scanner: {}",
        config.device.kind,
        config.control.bind_address,
        config.scanner.port
    );

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config),
        Command::SelfTest { dwell_ms } => self_test(config, Duration::from_millis(dwell_ms)),
    }
}
