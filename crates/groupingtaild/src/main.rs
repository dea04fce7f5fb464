//! groupingtaild - log tail metrics daemon.
//!
//! Tails the configured log files and syslog listeners, extracts metrics per
//! group and writes them to stdout as collectd `PUTVAL` lines, one batch per
//! interval. Diagnostics go to stderr.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use groupingtail_core::dispatch::PutvalWriter;
use groupingtail_core::{Collector, Config};

/// Log tail metrics daemon.
#[derive(Parser)]
#[command(name = "groupingtaild", about = "Log tail metrics daemon", version)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Poll interval in seconds (overrides the configuration).
    #[arg(short, long)]
    interval: Option<u64>,

    /// Host name used in metric identifiers (overrides the configuration).
    #[arg(long)]
    hostname: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["groupingtaild", "groupingtail_core"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("groupingtaild {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(interval) = args.interval {
        config.interval = interval.max(1);
    }
    if let Some(hostname) = args.hostname {
        config.hostname = hostname;
    }
    info!(
        "Config: {} files, interval={}s, hostname={}",
        config.files.len(),
        config.interval,
        config.hostname
    );

    let mut collector = match Collector::from_config(&config) {
        Ok(collector) => collector,
        Err(e) => {
            error!("Failed to start collector: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if collector.tail_count() == 0 {
        warn!("No files configured, nothing will be collected");
    }

    let mut writer = PutvalWriter::new(std::io::stdout(), &config.hostname, config.interval);
    let interval = Duration::from_secs(config.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting collection loop");
    let mut cycle_count: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let samples = collector.collect();
        cycle_count += 1;

        if let Err(e) = writer.write_all(&samples) {
            error!("Failed to write metrics: {}", e);
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                break;
            }
        }

        if let Some(timing) = collector.last_timing() {
            debug!(
                "Cycle #{}: {} samples, {} grouped lines in {:?}",
                cycle_count,
                samples.len(),
                timing.grouped_lines,
                timing.total
            );
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down...");
    // Dropping the collector stops syslog listeners and releases their sockets.
    drop(collector);
    info!("Shutdown complete after {} cycles", cycle_count);

    ExitCode::SUCCESS
}
