mod config;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use phev_pipe::events::{PipeContext, PipeEvent};
use phev_pipe::pipe::{PhevPipe, PipeSettings};
use phev_pipe::transport::{list_ports, TcpConnector};
use phev_pipe::PipeError;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{BridgeConfig, VehicleEndpoint};

/// Pause after a failed pump before the connection is retried
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    list_ports: bool,
    demo: bool,
}

/// One line of event output
#[derive(Serialize)]
struct EventRecord<'a> {
    timestamp: DateTime<Utc>,
    pipe: &'a str,
    #[serde(flatten)]
    event: &'a PipeEvent,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let options = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: phev-bridge [--config <path>] [--list-ports] [--demo]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --config <path>  JSON config file [default: built-in, demo vehicle]");
            eprintln!("  --list-ports     List serial ports and exit");
            eprintln!("  --demo           Use the simulated vehicle");
            process::exit(2);
        }
    };

    if let Err(e) = run(options) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                options.config = Some(PathBuf::from(args.get(i).ok_or("--config requires a value")?));
            }
            "--list-ports" => options.list_ports = true,
            "--demo" => options.demo = true,
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unknown argument: {arg}")),
        }
        i += 1;
    }

    Ok(options)
}

fn run(options: Options) -> anyhow::Result<()> {
    if options.list_ports {
        for port in list_ports() {
            match port.product {
                Some(product) => println!("{}\t{}", port.name, product),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let mut config = match &options.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if options.demo && !matches!(config.vehicle, VehicleEndpoint::Demo { .. }) {
        config.vehicle = VehicleEndpoint::default();
    }

    init_logging(&config.log_level)?;
    info!(
        name = %config.name,
        vehicle = ?config.vehicle,
        app = %config.app.address,
        version = phev_pipe::VERSION,
        "starting bridge"
    );

    let mut settings = PipeSettings::new(
        config.name.clone(),
        Box::new(TcpConnector::new(config.app.address.clone())),
        config.vehicle.connector(),
    );
    settings.read_timeout = config.read_timeout();
    settings.read_buffer_size = config.read_buffer_size;

    let pipe = Arc::new(PhevPipe::new(settings));
    pipe.register_event_listener(print_event);

    let outbound = spawn_pump(pipe.clone(), "vehicle-to-app", PhevPipe::pump_out)?;
    let inbound = spawn_pump(pipe, "app-to-vehicle", PhevPipe::pump_in)?;

    for handle in [outbound, inbound] {
        handle
            .join()
            .map_err(|_| anyhow!("pump thread panicked"))?;
    }
    Ok(())
}

fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid log level '{default_level}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print_event(ctx: &PipeContext, event: &PipeEvent) {
    let record = EventRecord {
        timestamp: Utc::now(),
        pipe: ctx.name(),
        event,
    };
    match serde_json::to_string(&record) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "failed to serialise event"),
    }
}

fn spawn_pump(
    pipe: Arc<PhevPipe>,
    name: &'static str,
    pump: fn(&PhevPipe) -> Result<usize, PipeError>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || loop {
            if let Err(e) = pump(&pipe) {
                warn!(direction = name, error = %e, "pump failed, retrying");
                thread::sleep(RETRY_DELAY);
            }
        })
        .with_context(|| format!("spawning {name} thread"))
}
