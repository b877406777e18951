use clap::Parser;
use quickdeck_core::acquisition::{DisplayFrame, DisplayRefresher};
use quickdeck_core::config::{ConfigLoader, SystemConfig};
use quickdeck_core::hal::{enumerate_ports, Role, SourceKind};
use quickdeck_core::session::{SessionCatalog, Summary};
use quickdeck_core::{DeckError, DeckResult, TestRig};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(clap::Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file, may be given more than once (later wins)
    #[arg(long = "config", global = true)]
    config: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// List serial ports that could host a device
    Ports,
    /// Record a test from the source named in the configuration
    Run {
        #[command(flatten)]
        run: RunArgs,
        /// Tare and calibrate before recording
        #[arg(long)]
        calibrate: bool,
    },
    /// Record a test fed by the load simulator
    Simulate {
        #[command(flatten)]
        run: RunArgs,
        /// Target load the simulator ramps towards
        #[arg(long, default_value_t = 500.0)]
        load: f64,
    },
    /// Record a test from the serial devices
    Record {
        #[command(flatten)]
        run: RunArgs,
        /// Overrides serial.strain_port
        #[arg(long)]
        strain_port: Option<String>,
        /// Overrides serial.motion_port
        #[arg(long)]
        motion_port: Option<String>,
        /// Tare and calibrate before recording
        #[arg(long)]
        calibrate: bool,
    },
    /// List recorded sessions, newest first
    Sessions,
    /// Print the summary of a recorded session
    Show { name: String },
    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Session name, defaults to test_<timestamp>
    #[arg(long)]
    name: Option<String>,
    /// Recording length in seconds
    #[arg(long, default_value_t = 10)]
    duration: u64,
    /// Extra metadata as key=value, repeatable
    #[arg(long = "meta", value_parser = parse_key_value)]
    metadata: Vec<(String, String)>,
}

impl RunArgs {
    fn metadata(&self) -> Option<Map<String, Value>> {
        if self.metadata.is_empty() {
            return None;
        }
        Some(
            self.metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quickdeck=info,quickdeck_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> DeckResult<()> {
    let mut loader = if cli.config.is_empty() {
        ConfigLoader::new()
    } else {
        ConfigLoader::with_paths(cli.config)
    };
    let mut config = loader.load()?;

    match cli.command {
        Command::Ports => list_ports(),
        Command::Run { run, calibrate } => record(open_rig(config)?, &run, calibrate),
        Command::Simulate { run, load } => {
            config.acquisition.source = SourceKind::Simulated;
            let rig = open_rig(config)?;
            if let Some(sim) = rig.simulator() {
                sim.set_target_load(load);
            }
            record(rig, &run, false)
        }
        Command::Record {
            run,
            strain_port,
            motion_port,
            calibrate,
        } => {
            config.acquisition.source = SourceKind::Hardware;
            if strain_port.is_some() {
                config.serial.strain_port = strain_port;
            }
            if motion_port.is_some() {
                config.serial.motion_port = motion_port;
            }
            record(open_rig(config)?, &run, calibrate)
        }
        Command::Sessions => list_sessions(&config),
        Command::Show { name } => show_session(&config, &name),
        Command::Config { export } => match export {
            Some(path) => {
                loader.export_config(&path)?;
                println!("Configuration written to {}", path.display());
                Ok(())
            }
            None => {
                let body = toml::to_string_pretty(loader.current())
                    .map_err(|e| DeckError::Configuration(e.to_string()))?;
                print!("{body}");
                Ok(())
            }
        },
    }
}

fn list_ports() -> DeckResult<()> {
    let ports = enumerate_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{:<24} {}", port.device_id, port.description);
    }
    Ok(())
}

fn open_rig(config: SystemConfig) -> DeckResult<TestRig> {
    let rig = TestRig::from_config(config)?;
    if rig.source_kind() == SourceKind::Hardware {
        for role in Role::ALL {
            println!("{role}: {}", rig.connection_state(role));
        }
    }
    Ok(rig)
}

fn record(mut rig: TestRig, args: &RunArgs, calibrate: bool) -> DeckResult<()> {
    if calibrate {
        rig.calibrate()?;
    }

    let session = rig.start_test(args.name.as_deref(), args.metadata())?;
    println!("Recording {} into {}", session.name, session.directory.display());

    let refresher = DisplayRefresher::spawn(
        Arc::clone(rig.live_buffer()),
        rig.config().display.refresh_interval(),
        |frame: &DisplayFrame| {
            println!(
                "  strain |max| {:>10.4}   pitch |max| {:>8.4}",
                frame.group_extreme(Role::Strain),
                frame.group_extreme(Role::Motion)
            );
        },
    )?;

    std::thread::sleep(Duration::from_secs(args.duration));
    refresher.stop();

    let outcome = rig.stop_test(None)?;
    for role in outcome.acquisition.abandoned.iter() {
        println!("warning: {role} reader did not stop in time");
    }
    for fault in outcome.acquisition.faults() {
        println!("warning: {fault}");
    }
    print_summary(&outcome.summary);
    Ok(())
}

fn list_sessions(config: &SystemConfig) -> DeckResult<()> {
    let sessions = SessionCatalog::new(&config.storage.base_dir).list()?;
    if sessions.is_empty() {
        println!("No sessions in {}", config.storage.base_dir.display());
    }
    for info in sessions {
        let state = if info.finalized { "finalized" } else { "open" };
        println!("{:<32} {}  {}", info.name, info.start_time.to_rfc3339(), state);
    }
    Ok(())
}

fn show_session(config: &SystemConfig, name: &str) -> DeckResult<()> {
    let data = SessionCatalog::new(&config.storage.base_dir).load(name)?;
    if let Some(metadata) = &data.metadata {
        println!("Session {}", metadata.test_name);
        println!("  started  {}", metadata.start_time.to_rfc3339());
        if let Some(end) = metadata.end_time {
            println!("  finished {}", end.to_rfc3339());
        }
        for (key, value) in &metadata.extra {
            println!("  {key} = {value}");
        }
    }
    println!("  rows: {} strain, {} motion", data.strain.len(), data.motion.len());
    match &data.summary {
        Some(summary) => print_summary(summary),
        None => println!("  (not finalized)"),
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!(
        "Duration {:.3} s, {} strain samples, {} motion samples",
        summary.duration_seconds, summary.strain_samples, summary.motion_samples
    );
    for (name, stats) in summary.strain_statistics.iter().chain(&summary.motion_statistics) {
        println!(
            "  {name:<14} min {:>10.4} max {:>10.4} mean {:>10.4} std {:>8.4}",
            stats.min, stats.max, stats.mean, stats.std
        );
    }
    for (sensor, angle) in &summary.max_angle {
        println!("  {sensor} max angle {angle:.3}");
    }
}
