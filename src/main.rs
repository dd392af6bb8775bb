//! LabJack Scale binary.
//!
//! Runs the background sampler and serves the HTTP API until interrupted.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use labjack_scale::{
    start_web_server, AnalogDriver, Calibration, DeviceGateway, NoHardwareDriver, Sampler,
    SamplerConfig, ScaleService, SimulatedDriver, SystemClock, WebConfig, DEFAULT_CHANNEL,
    DEFAULT_DEV_PORT, DEFAULT_HISTORY_CAPACITY, DEFAULT_INTERVAL_MS, DEFAULT_MOCK_VOLTAGE,
    DEFAULT_PROD_PORT, DEFAULT_SCALE_FACTOR,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "labjack_scale")]
#[command(about = "LabJack load-cell sampler with HTTP calibration API")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port (defaults to 5001 for dev, 5000 for prod)
    #[arg(short, long)]
    port: Option<u16>,

    /// Deployment profile, selects the default port
    #[arg(long, value_enum, default_value_t = Profile::Dev)]
    profile: Profile,

    /// Polling interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Number of per-second averages to retain
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history_capacity: usize,

    /// Voltage reported while no device is connected
    #[arg(long, default_value_t = DEFAULT_MOCK_VOLTAGE)]
    mock_voltage: f64,

    /// Retry opening the device every N seconds while degraded
    #[arg(long, value_name = "SECS")]
    reconnect_secs: Option<u64>,

    /// Initial tare voltage
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    tare: f64,

    /// Initial scale factor (weight units per volt)
    #[arg(long, default_value_t = DEFAULT_SCALE_FACTOR, allow_negative_numbers = true)]
    scale: f64,

    /// Use a simulated sensor instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Directory for the daily rolling log file
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Do not write a log file
    #[arg(long)]
    no_log_file: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn default_port(self) -> u16 {
        match self {
            Profile::Dev => DEFAULT_DEV_PORT,
            Profile::Prod => DEFAULT_PROD_PORT,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sampler and web server (default)
    Serve(ServeArgs),

    /// Open the device, print a few readings and exit
    Probe(ProbeArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Directory holding index.html and static assets
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct ProbeArgs {
    /// Number of readings to take
    #[arg(short, long, default_value_t = 5)]
    count: u32,

    /// Delay between readings in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Held until exit so buffered log lines reach the file.
    let _log_guard = init_logging(&cli)?;

    print_banner();

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await,
        Some(Commands::Probe(args)) => probe_command(&cli, args).await,
        None => serve_command(&cli, &ServeArgs::default()).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if cli.debug {
        LevelFilter::DEBUG
    } else if cli.verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };

    let console_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let console = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let (file, guard) = if cli.no_log_file {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&cli.log_dir, "labjack_scale.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(level.max(LevelFilter::INFO));
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(guard)
}

fn print_banner() {
    println!("LabJack Scale");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn make_driver(simulate: bool) -> Box<dyn AnalogDriver> {
    if simulate {
        info!("Using simulated sensor");
        Box::new(SimulatedDriver::wave(1.2, 0.05))
    } else {
        Box::new(NoHardwareDriver::new())
    }
}

fn sampler_config(cli: &Cli) -> SamplerConfig {
    SamplerConfig::default()
        .with_period(Duration::from_millis(cli.interval))
        .with_history_capacity(cli.history_capacity)
        .with_mock_voltage(cli.mock_voltage)
        .with_reconnect_interval(cli.reconnect_secs.map(Duration::from_secs))
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    info!("Starting LabJack scale...");

    let config = sampler_config(cli);
    let calibration =
        Calibration::new(cli.tare, cli.scale).context("invalid startup calibration")?;
    let service = Arc::new(ScaleService::new(&config, calibration));

    let gateway = DeviceGateway::new(make_driver(cli.simulate), config.channel);
    info!("Sampler configuration:");
    info!("  - Poll interval: {}ms", config.period.as_millis());
    info!("  - History capacity: {}", config.history_capacity);
    info!("  - Mock voltage: {} V", config.mock_voltage);
    let sampler = Sampler::new(gateway, service.clone(), config)
        .context("failed to create sampler")?
        .spawn(Arc::new(SystemClock));

    let port = cli.port.unwrap_or_else(|| cli.profile.default_port());
    let mut web_config = WebConfig::new(&cli.host, port).with_cors(!args.no_cors);
    if let Some(static_dir) = &args.static_dir {
        web_config = web_config.with_static_path(Some(static_dir.clone()));
    }
    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);

    let served = start_web_server(web_config, service, shutdown_signal()).await;

    info!("Stopping sampler...");
    sampler
        .shutdown()
        .await
        .context("sampler did not stop cleanly")?;
    served.context("web server failed")?;

    info!("Shutdown complete");
    Ok(())
}

async fn probe_command(cli: &Cli, args: &ProbeArgs) -> anyhow::Result<()> {
    let calibration = Calibration::new(cli.tare, cli.scale)?;
    let mut gateway = DeviceGateway::new(make_driver(cli.simulate), DEFAULT_CHANNEL);

    println!("Attempting to open device ({} driver)...", gateway.driver_name());
    gateway.open().context("failed to open device")?;
    println!("Device opened, reading AIN{}", gateway.channel());

    for i in 1..=args.count {
        match gateway.read() {
            Ok(voltage) => println!(
                "Reading {}: {:.6} V -> {:.3}",
                i,
                voltage,
                calibration.weight(voltage)
            ),
            Err(e) => println!("Reading {}: error: {}", i, e),
        }
        if i < args.count {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    gateway.close();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["labjack_scale", "--port", "9090"]).unwrap();
        assert_eq!(cli.port, Some(9090));
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["labjack_scale"]).unwrap();
        assert_eq!(cli.port, None);
        assert_eq!(cli.profile.default_port(), DEFAULT_DEV_PORT);
        assert_eq!(cli.interval, DEFAULT_INTERVAL_MS);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.scale, DEFAULT_SCALE_FACTOR);
        assert!(!cli.simulate);
    }

    #[test]
    fn test_prod_profile_port() {
        let cli = Cli::try_parse_from(["labjack_scale", "--profile", "prod"]).unwrap();
        assert_eq!(cli.profile.default_port(), DEFAULT_PROD_PORT);
    }

    #[test]
    fn test_sampler_config_from_flags() {
        let cli = Cli::try_parse_from([
            "labjack_scale",
            "--interval",
            "100",
            "--reconnect-secs",
            "30",
            "--tare",
            "-0.25",
        ])
        .unwrap();
        let config = sampler_config(&cli);
        assert_eq!(config.period, Duration::from_millis(100));
        assert_eq!(config.reconnect_interval, Some(Duration::from_secs(30)));
        assert_eq!(cli.tare, -0.25);
    }

    #[test]
    fn test_probe_subcommand() {
        let cli = Cli::try_parse_from(["labjack_scale", "--simulate", "probe", "-c", "3"]).unwrap();
        match cli.command {
            Some(Commands::Probe(args)) => assert_eq!(args.count, 3),
            _ => panic!("expected probe subcommand"),
        }
    }
}
