//! MTConnect Monitor CLI Application
//!
//! This is the command-line host for the mtconnect-stream library.
//! It adds:
//! - Config file loading (config.toml) with command-line overrides
//! - Catalog listing
//! - Live polling with a status line and CSV/JSON export on exit
//! - Robot pose sampling into a JSON log

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mtconnect_stream::export::{export_csv, write_json};
use mtconnect_stream::pose::sample_pose;
use mtconnect_stream::{HttpSource, PoseLog, StartOutcome, StreamMonitor};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Duration, Instant};

mod config;

use config::{AppConfig, SignalTrackMode};

/// MTConnect Monitor - Discover and poll MTConnect agents
#[derive(Parser, Debug)]
#[command(name = "mtconnect-cli")]
#[command(about = "Discover and poll MTConnect agent data items", long_about = None)]
#[command(version)]
struct Args {
    /// Agent `current` URL (overrides the config file)
    #[arg(short, long, value_name = "URL", global = true)]
    url: Option<String>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Poll interval in milliseconds (overrides the config file)
    #[arg(long, value_name = "MS", global = true)]
    interval_ms: Option<u64>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the numeric and status signals the agent currently reports
    Discover,

    /// Poll selected signals and export the history on exit
    Poll {
        /// Display label to poll (can be repeated)
        #[arg(short, long, value_name = "LABEL")]
        select: Vec<String>,

        /// Poll every discovered signal
        #[arg(long)]
        all: bool,

        /// Number of cycles to run (default: until stopped)
        #[arg(short = 'n', long, value_name = "COUNT")]
        iterations: Option<u64>,

        /// Write the history as CSV on exit
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Write the history as JSON on exit
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },

    /// Sample the robot pose (joint angles, position, orientation) into a JSON log
    Pose {
        /// Number of samples to take
        #[arg(short = 'n', long, value_name = "COUNT", default_value_t = 10)]
        iterations: u64,

        /// Pose log file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("MTConnect Monitor CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using stream library v{}", mtconnect_stream::VERSION);

    let mut app_config = match (&args.config, &args.url) {
        (Some(path), _) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        (None, Some(url)) => AppConfig::for_url(url.clone()),
        (None, None) => {
            println!("MTConnect Monitor - No agent specified");
            println!("\nQuick Start:");
            println!("  mtconnect-cli --url http://localhost:5000/current discover");
            println!("  mtconnect-cli --url http://localhost:5000/current poll -s \"Srpm (C - Mazak)\" -n 10");
            println!("\nFor advanced features:");
            println!("  mtconnect-cli --config config.toml poll");
            println!("\nUse --help for more options");
            return Ok(());
        }
    };

    if let Some(url) = &args.url {
        app_config.agent.url = url.clone();
    }
    if let Some(interval_ms) = args.interval_ms {
        app_config.polling.interval_ms = interval_ms;
    }

    match args.command {
        Command::Discover => discover_mode(&app_config),
        Command::Poll {
            select,
            all,
            iterations,
            output,
            json,
        } => {
            if all {
                app_config.signals.track = SignalTrackMode::All("all".to_string());
            } else if !select.is_empty() {
                app_config.signals.track = SignalTrackMode::List(select);
            }
            if iterations.is_some() {
                app_config.polling.iterations = iterations;
            }
            if output.is_some() {
                app_config.output.csv = output;
            }
            if json.is_some() {
                app_config.output.json = json;
            }
            poll_mode(&app_config)
        }
        Command::Pose { iterations, output } => {
            if output.is_some() {
                app_config.output.pose_log = output;
            }
            pose_mode(&app_config, iterations)
        }
    }
}

/// Discover mode - fetch once and print the catalog
fn discover_mode(app_config: &AppConfig) -> Result<()> {
    let monitor = StreamMonitor::connect_http(app_config.monitor_config())?;
    let catalog = monitor.get_catalog();

    println!("═══════════════════════════════════════════════");
    println!("  MTConnect Signal Catalog");
    println!("═══════════════════════════════════════════════\n");

    println!("Numeric signals ({}):", catalog.numeric_signals().len());
    for (label, internal_name) in catalog.numeric_signals().iter() {
        println!("  {:<50} [{}]", label, internal_name);
    }

    println!("\nStatus signals ({}):", catalog.status_signals().len());
    for (label, internal_name) in catalog.status_signals().iter() {
        println!("  {:<50} [{}]", label, internal_name);
    }

    if !monitor.roles().is_empty() {
        println!("\nStatus roles:");
        let mut roles: Vec<_> = monitor.roles().iter().collect();
        roles.sort_by_key(|(role, _)| role.to_string());
        for (role, label) in roles {
            println!("  {:<14} → {}", role.to_string(), label);
        }
    }

    if catalog.is_empty() {
        println!("\n⚠️  No signals available (agent unreachable or empty document)");
    }

    Ok(())
}

/// Poll mode - run a session and export on exit
fn poll_mode(app_config: &AppConfig) -> Result<()> {
    let monitor = StreamMonitor::connect_http(app_config.monitor_config())?;
    let catalog = monitor.get_catalog();

    let labels: Vec<String> = match &app_config.signals.track {
        SignalTrackMode::All(_) => catalog.select_all().labels().map(str::to_string).collect(),
        SignalTrackMode::List(labels) => labels.clone(),
    };
    if labels.is_empty() {
        anyhow::bail!("No signals selected: use --select <LABEL> or --all (see `discover`)");
    }

    if monitor.set_selection(&labels)? == StartOutcome::Overlapping {
        log::warn!("A previous poll loop is still running");
    }
    let selection = monitor
        .selection()
        .context("poll session did not start")?;
    if selection.is_empty() {
        anyhow::bail!("None of the requested labels are in the catalog (see `discover`)");
    }

    println!("Polling {} signals every {} ms\n", selection.len(), app_config.polling.interval_ms);

    let interval = Duration::from_millis(app_config.polling.interval_ms);
    let mut cycle: u64 = 0;
    let mut last_timestamp: Option<String> = None;
    while app_config.polling.iterations.map_or(true, |n| cycle < n) {
        let started = Instant::now();
        std::thread::sleep(interval);
        cycle += 1;

        match monitor.latest_record() {
            Some(record) if last_timestamp.as_deref() != Some(record.timestamp()) => {
                println!("Pull #{} @ {}", cycle, record.timestamp());
                for (label, value) in record.values() {
                    println!("  {:<50} {}", label, value);
                }
                println!("  {}", monitor.status_panel());
                last_timestamp = Some(record.timestamp().to_string());
            }
            Some(_) => log::debug!("No new record in cycle {}", cycle),
            None => println!("Pull #{}: no data collected", cycle),
        }
        log::trace!("Cycle {} took {:?}", cycle, started.elapsed());
    }

    if !monitor.stop() {
        log::warn!("Poll loop did not stop in time");
    }

    let snapshot = monitor.get_latest_snapshot();
    if let Some(path) = &app_config.output.csv {
        let rows = export_csv(path, &selection, &snapshot)
            .with_context(|| format!("Failed to write CSV: {:?}", path))?;
        println!("\n✓ Saved {} records to {:?}", rows, path);
    }
    if let Some(path) = &app_config.output.json {
        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        write_json(BufWriter::new(file), &snapshot)?;
        println!("✓ Saved {} records to {:?}", snapshot.len(), path);
    }

    Ok(())
}

/// Pose mode - sample the robot pose at the poll interval
fn pose_mode(app_config: &AppConfig, iterations: u64) -> Result<()> {
    let monitor_config = app_config.monitor_config();
    monitor_config.validate()?;
    let source = HttpSource::new(monitor_config.fetch_timeout())?;
    let interval = monitor_config.poll_interval();

    let mut pose_log = PoseLog::new();
    for i in 0..iterations {
        let started = Instant::now();

        match sample_pose(&source, &monitor_config.agent_url, monitor_config.namespace.as_deref()) {
            Ok(sample) => {
                println!(
                    "Sample #{} @ {}: position {:?} orientation {:?}",
                    i + 1,
                    sample.timestamp,
                    sample.position,
                    sample.orientation
                );
                pose_log.push(sample);
            }
            Err(e) => log::warn!("MTConnect data unavailable, skipping sample: {}", e),
        }

        if i + 1 < iterations {
            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }
    }

    let path = app_config
        .output
        .pose_log
        .clone()
        .unwrap_or_else(|| PathBuf::from("capture_log.json"));
    pose_log
        .save(&path)
        .with_context(|| format!("Failed to write pose log: {:?}", path))?;
    println!("\n✓ Saved {} pose samples to {:?}", pose_log.len(), path);

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
