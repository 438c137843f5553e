use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use blelink_lib::control::{ControlOpcode, ControlTable, terminate_on_request};
use blelink_lib::sim::{SimClock, SimRadio};
use blelink_lib::{LinkConfig, LinkEvent, LinkLayer, TickRate};

mod central;

use central::Central;

/// Run the BLE peripheral link layer against a simulated central.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON link configuration. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of state machine steps to run.
    #[arg(short, long, default_value_t = 40)]
    steps: u32,
    /// Data PDUs the central sends before it stops answering.
    #[arg(short, long)]
    drop_after: Option<u32>,
    /// End the connection with LL_TERMINATE_IND instead of going silent.
    #[arg(short, long)]
    terminate: bool,
    /// Override the hardware tick rate of the configuration.
    #[arg(long)]
    ticks_per_us: Option<u32>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v, TRACE with -vv
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn load_config(path: Option<&PathBuf>) -> Result<LinkConfig> {
    let Some(path) = path else {
        return Ok(LinkConfig::default());
    };
    let file = File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("Failed to parse config {:?}", path))
}

fn event_name(event: &LinkEvent) -> &'static str {
    match event {
        LinkEvent::Advertised { .. } => "advertised",
        LinkEvent::ScanResponseSent { .. } => "scan response",
        LinkEvent::ConnectRequested { .. } => "connect request",
        LinkEvent::ConnectionRejected { .. } => "connection rejected",
        LinkEvent::Connected { .. } => "connected",
        LinkEvent::DataReceived { .. } => "data",
        LinkEvent::EventMissed { .. } => "missed event",
        LinkEvent::ConnectionLost { .. } => "connection lost",
        LinkEvent::Terminated { .. } => "terminated",
        LinkEvent::FrameDiscarded { .. } => "discarded",
        LinkEvent::Ignored { .. } => "ignored",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(ticks_per_us) = cli.ticks_per_us {
        config.tick_rate = TickRate::new(ticks_per_us);
    }

    let clock = SimClock::new(1);
    let central = Central::new(config.address, config.tick_rate.t_ifs(), cli.drop_after, cli.terminate);
    info!("Simulated central {} targeting {}", central.address(), config.address);
    let radio = SimRadio::new(clock.clone(), central);

    let mut controls = ControlTable::new();
    controls.register(ControlOpcode::TerminateInd, terminate_on_request);
    let mut link = LinkLayer::new(radio, clock, config)
        .context("Invalid link configuration")?
        .with_controls(controls);

    let mut summary: BTreeMap<&'static str, u32> = BTreeMap::new();
    for _ in 0..cli.steps {
        let event = link.step();
        info!("[{}] {:?}", link.state().name(), event);
        *summary.entry(event_name(&event)).or_default() += 1;
    }

    info!("Summary after {} steps:", cli.steps);
    for (name, count) in &summary {
        info!("  {:<20} {}", name, count);
    }
    Ok(())
}
