//! `seamtrack` – command line front end of the seam tracking stack.
//!
//! - `replay` runs a recorded seam file through the filter and planner and
//!   reports the motion increments that would have been sent.
//! - `monitor` connects to the robot controller and prints its status once a
//!   second until Ctrl-C, then shuts the link down cleanly.

mod args;
mod replay;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;
use tracing::{info, warn};

use seamtrack_hal::RobotLink;
use seamtrack_runtime::config::{self, TrackerConfig};
use seamtrack_runtime::{telemetry, trajectory_file};
use seamtrack_types::{CommStatus, SeamError};

use args::Command;

const STATUS_PERIOD: Duration = Duration::from_secs(1);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    telemetry::init_tracing("seamtrack");

    let command = match args::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}: {e}\n\n{}", "error".red().bold(), args::USAGE);
            return ExitCode::from(2);
        }
    };

    let result = match command {
        Command::Help => {
            println!("{}", args::USAGE);
            Ok(())
        }
        Command::Replay { input, config, out } => {
            run_replay(&input, config.as_deref(), out.as_deref())
        }
        Command::Monitor { config } => run_monitor(config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Config from `path`, or the defaults with environment overrides.
fn load_config(path: Option<&Path>) -> Result<TrackerConfig, SeamError> {
    match path {
        Some(path) => config::load_from(path)?.ok_or_else(|| {
            SeamError::Config(format!("config file {} not found", path.display()))
        }),
        None => {
            let mut cfg = TrackerConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// replay
// ─────────────────────────────────────────────────────────────────────────────

fn run_replay(input: &Path, config: Option<&Path>, out: Option<&Path>) -> Result<(), SeamError> {
    let cfg = load_config(config)?;
    let points = trajectory_file::read_points(input)?;
    info!(input = %input.display(), points = points.len(), "replay started");

    let summary = replay::replay(&cfg, &points)?;

    println!("  {} {}", "Seam".bold(), input.display());
    println!("    points      {}", summary.points);
    println!("    length      {:.2} mm", summary.total_len);
    println!("    increments  {}", summary.increments.len());
    println!("    frames      {}", summary.frames);

    if let Some(out) = out {
        trajectory_file::write_points(out, &summary.smoothed)?;
        println!(
            "  {} smoothed points written to {}",
            "✓".green().bold(),
            out.display().to_string().bold()
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// monitor
// ─────────────────────────────────────────────────────────────────────────────

fn run_monitor(config: Option<&Path>) -> Result<(), SeamError> {
    let cfg = load_config(config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot link …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the process another way");
    }

    let mut link = RobotLink::new(cfg.link.clone());
    print!("  Connecting to {} … ", cfg.link.controller_addr.dimmed());
    let _ = std::io::stdout().flush();
    match link.start() {
        CommStatus::Ok => println!("{}", "online".green()),
        status => {
            println!("{}", "offline".red());
            return Err(SeamError::Io(format!(
                "could not reach controller at {} ({status:?})",
                cfg.link.controller_addr
            )));
        }
    }

    let mut next_report = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        if Instant::now() >= next_report {
            report(&link);
            next_report += STATUS_PERIOD;
        }
        if !link.is_running() {
            warn!("robot link stopped unexpectedly");
            break;
        }
        thread::sleep(SHUTDOWN_POLL);
    }

    link.shutdown();
    println!("{}", "  ✓ Robot link closed.".green());
    Ok(())
}

fn report(link: &RobotLink) {
    let status = link.status();
    let comm = link.comm_status();
    let data = link.data_status();
    let comm_label = match comm {
        CommStatus::Ok => format!("{comm:?}").green(),
        _ => format!("{comm:?}").red(),
    };
    let [x, y, z, rx, ry, rz] = status.tool_pose();
    println!(
        "  [{comm_label}] data={data:?} queue={} tool=({x:.3}, {y:.3}, {z:.3}, {rx:.2}, {ry:.2}, {rz:.2})",
        status.queue_count
    );
    info!(
        ?comm,
        ?data,
        queue = status.queue_count,
        updated_at = ?status.updated_at,
        "robot status"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn seam_file(dir: &Path) -> std::path::PathBuf {
        let points: Vec<[f64; 3]> = (0..11).map(|i| [f64::from(i), 0.0, 5.0]).collect();
        let path = dir.join("seam.txt");
        trajectory_file::write_points(&path, &points).unwrap();
        path
    }

    #[test]
    fn replay_writes_one_smoothed_point_per_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = seam_file(dir.path());
        let out = dir.path().join("smoothed.txt");

        run_replay(&input, None, Some(&out)).unwrap();

        let smoothed = trajectory_file::read_points(&out).unwrap();
        assert_eq!(smoothed.len(), 11);
        assert!(smoothed.iter().all(|p| p[0] <= 10.0 && (p[2] - 5.0).abs() < 1e-9));
    }

    #[test]
    fn replay_reads_the_given_config() {
        let dir = tempfile::tempdir().unwrap();
        let input = seam_file(dir.path());
        let config = dir.path().join("cell.toml");
        fs::write(&config, "[planner]\nweld_speed = 30.0\nfilter_delay = 1\n").unwrap();
        let out = dir.path().join("smoothed.txt");

        run_replay(&input, Some(&config), Some(&out)).unwrap();
        assert_eq!(trajectory_file::read_points(&out).unwrap().len(), 11);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = seam_file(dir.path());
        let out = dir.path().join("smoothed.txt");

        let err = run_replay(&input, Some(&dir.path().join("absent.toml")), Some(&out)).unwrap_err();
        assert!(matches!(err, SeamError::Config(_)));
        assert!(!out.exists());
    }
}
