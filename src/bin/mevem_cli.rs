use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use mevem_core::calibration::CalibrationStore;
use mevem_core::error::CalibrationError;
use mevem_core::serial::SerialPortOpener;
use mevem_core::{AppConfig, MeasurementPoint, SensorEngine};

#[derive(Parser, Debug)]
#[command(
    name = "mevem-cli",
    about = "MEVEM bench tool: monitor the force/angle sensor and run calibrations"
)]
struct Cli {
    /// Serial device path (defaults to the configured port)
    #[arg(long, global = true)]
    port: Option<String>,
    /// Baud rate override
    #[arg(long, global = true)]
    baud: Option<u32>,
    /// Log verbosity: off, error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream window-averaged measurement points to stdout as JSON lines
    Monitor {
        /// Stop after this many seconds (runs until interrupted otherwise)
        #[arg(long)]
        duration: Option<u64>,
        /// Averaging window size (1-100)
        #[arg(long)]
        window: Option<u32>,
    },
    /// Run the four-step guided calibration procedure
    Calibrate,
    /// Capture raw channel averages over a short window
    Sample {
        /// Capture duration in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
    /// Print the persisted calibration status
    Status,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level)
        .format_timestamp_millis()
        .init();

    let mut config = AppConfig::load();
    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }

    let engine = SensorEngine::with_parts(
        config,
        Arc::new(SerialPortOpener),
        CalibrationStore::open_default(),
    );

    match cli.command {
        Commands::Monitor { duration, window } => run_monitor(&engine, duration, window),
        Commands::Calibrate => run_calibrate(&engine),
        Commands::Sample { duration_ms } => run_sample(&engine, duration_ms),
        Commands::Status => run_status(&engine),
    }
}

fn run_monitor(
    engine: &SensorEngine,
    duration: Option<u64>,
    window: Option<u32>,
) -> Result<ExitCode> {
    if let Some(window) = window {
        engine.set_window_size(window)?;
    }

    engine.start_acquisition()?;
    let mut rx = engine
        .subscribe_measurements()
        .context("measurement channel missing after start")?;

    eprintln!("Monitoring... points stream as JSON lines on stdout");

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut points: Vec<MeasurementPoint> = Vec::new();

    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        match rx.try_recv() {
            Ok(point) => {
                println!("{}", serde_json::to_string(&point)?);
                points.push(point);
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Empty) => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(skipped)) => {
                eprintln!("Consumer lagged, {skipped} points skipped");
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Closed) => break,
        }
    }

    engine.stop_acquisition()?;
    emit_summary(&points);
    Ok(ExitCode::from(0))
}

fn emit_summary(points: &[MeasurementPoint]) {
    if points.is_empty() {
        eprintln!("No measurement points captured");
        return;
    }

    let angles: Vec<f64> = points.iter().map(|p| p.angle).collect();
    let forces: Vec<f64> = points.iter().map(|p| p.force).collect();
    let min_max = |values: &[f64]| {
        values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
    };
    let (angle_lo, angle_hi) = min_max(&angles);
    let (force_lo, force_hi) = min_max(&forces);

    eprintln!("Summary: {} points", points.len());
    eprintln!("  Angle: {:.1} - {:.1} deg", angle_lo, angle_hi);
    eprintln!("  Force: {:.3} - {:.3} kg", force_lo, force_hi);
}

fn run_calibrate(engine: &SensorEngine) -> Result<ExitCode> {
    let progress = engine.start_calibration()?;
    eprintln!(
        "Calibration: {} steps, ~3 s capture each",
        progress.steps_total
    );

    loop {
        let step = match engine.calibration_step() {
            Ok(step) => step,
            Err(CalibrationError::NotInProgress) => break,
            Err(err) => return Err(err.into()),
        };

        eprintln!();
        eprintln!("[{}] {}", step.display_name(), step.instruction());
        wait_for_enter()?;

        match engine.capture_calibration_step() {
            Ok(progress) => {
                eprintln!(
                    "Recorded ({}/{})",
                    progress.steps_completed, progress.steps_total
                );
            }
            Err(CalibrationError::SamplingTimeout { reason }) => {
                eprintln!("No frames captured ({reason}). Check the sensor and retry this step.");
            }
            Err(err) => return Err(err.into()),
        }
    }

    eprintln!();
    eprintln!("Calibration complete and saved:");
    run_status(engine)
}

fn wait_for_enter() -> Result<()> {
    eprint!("  Press Enter when ready... ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("reading operator confirmation")?;
    Ok(())
}

fn run_sample(engine: &SensorEngine, duration_ms: Option<u64>) -> Result<ExitCode> {
    let duration = duration_ms.map(Duration::from_millis);
    let (angle_avg, force_avg) = engine.sample_raw(duration)?;
    println!(
        "{}",
        serde_json::json!({
            "angle_raw_avg": (angle_avg * 10.0).round() / 10.0,
            "force_raw_avg": (force_avg * 10.0).round() / 10.0,
        })
    );
    Ok(ExitCode::from(0))
}

fn run_status(engine: &SensorEngine) -> Result<ExitCode> {
    let status = engine.calibration_status()?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(ExitCode::from(0))
}
