//! Headless demo: flies a camera down onto a procedural globe and lets the
//! quadtree select and load terrain tiles every frame.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p nebula-globe-demo -- --frames 600 --max-sse 4`.

mod flight;
mod globe_provider;
mod horizon;
mod surface;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use nebula_config::{CliArgs, Config};
use tracing::{error, info};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nebula-quadtree")
    });

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    nebula_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    info!(
        "Flying {} frames from {:.0} km to {:.0} km over ({:.2}, {:.2})",
        config.demo.frames,
        config.demo.start_altitude_m / 1000.0,
        config.demo.end_altitude_m / 1000.0,
        config.demo.target_longitude_deg,
        config.demo.target_latitude_deg
    );

    let report = match flight::fly(&config) {
        Ok(report) => report,
        Err(err) => {
            error!("Flight aborted: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "After {} frames: {} tiles requested, {} loaded, {} failed, {} upsampled",
        report.frames,
        report.loads.requested,
        report.loads.completed,
        report.loads.failed,
        report.loads.upsampled
    );
    info!(
        "Last frame: {} tiles rendered ({} filled from ancestors), {} loads outstanding, deepest level {}",
        report.rendered_last_frame,
        report.filled_last_frame,
        report.outstanding_loads,
        report.deepest_level
    );
    let answered = report.heights.iter().flatten().count();
    info!(
        "Height queries: {answered}/{} answered, {} callbacks",
        report.heights.len(),
        report.height_answers
    );
    if report.failed_frames > 0 {
        info!("{} frames skipped after provider errors", report.failed_frames);
    }

    ExitCode::SUCCESS
}
