//! Reminder replay and probe CLI.
//!
//! # Responsibility
//! - Replay recorded position tracks against a plan snapshot and print the
//!   reminders that would fire.
//! - Follow a live JSON-lines position feed on stdin.
//! - Keep a tiny probe to validate core crate wiring.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use donetogether_core::{
    haversine_km, init_logging_from_settings, parse_snapshot, ChannelLocationProvider,
    ClockSource, CooldownStore, DeliveryError, FnNotificationSink, InMemoryCooldownStore,
    LocationProvider, LogNotificationSink, NotificationRequest, NotificationSink,
    PermissionStatus, PlanSnapshot, Position, ReminderSettings, ReminderTracker,
    ReplayLocationProvider, RunSummary, SqliteCooldownStore,
};
use log::warn;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;

#[derive(Parser)]
#[command(name = "donetogether", version, about = "Proximity reminder tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded JSON-lines track against a plan snapshot.
    Replay {
        #[command(flatten)]
        common: CommonArgs,
        /// JSON-lines file, one position per line.
        #[arg(long)]
        track: PathBuf,
    },
    /// Read JSON-lines positions from stdin until EOF.
    Follow {
        #[command(flatten)]
        common: CommonArgs,
        /// Use the wall clock instead of each fix's timestamp.
        #[arg(long)]
        wall_clock: bool,
    },
    /// Print the haversine distance in meters between two coordinates.
    Distance {
        #[arg(allow_hyphen_values = true)]
        lat1: f64,
        #[arg(allow_hyphen_values = true)]
        lon1: f64,
        #[arg(allow_hyphen_values = true)]
        lat2: f64,
        #[arg(allow_hyphen_values = true)]
        lon2: f64,
    },
    /// Print core linkage probe output.
    Ping,
}

#[derive(Args)]
struct CommonArgs {
    /// JSON array of plan documents.
    #[arg(long)]
    plans: PathBuf,
    /// Optional JSON settings file.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Durable cooldown database; overrides the settings file.
    #[arg(long)]
    cooldown_db: Option<PathBuf>,
    /// Print reminders as JSON lines.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Replay { common, track } => {
            let positions = read_track(&track)?;
            let mut provider = ReplayLocationProvider::new(positions);
            let summary = run_tracker(&common, &mut provider, ClockSource::PositionTimestamp)?;
            print_summary(&summary, common.json);
        }
        Command::Follow { common, wall_clock } => {
            let (mut provider, sender) = ChannelLocationProvider::new(PermissionStatus::Granted);
            let reader = thread::spawn(move || {
                let stdin = std::io::stdin();
                for (index, line) in stdin.lock().lines().enumerate() {
                    let Ok(line) = line else { break };
                    match parse_track_line(&line) {
                        Ok(Some(position)) => {
                            if !sender.send(position) {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(
                            "event=track_line_rejected module=cli status=error line={} error={}",
                            index + 1,
                            err
                        ),
                    }
                }
            });
            let clock = if wall_clock {
                ClockSource::System
            } else {
                ClockSource::PositionTimestamp
            };
            let summary = run_tracker(&common, &mut provider, clock)?;
            if reader.join().is_err() {
                bail!("stdin reader thread panicked");
            }
            print_summary(&summary, common.json);
        }
        Command::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            println!("{:.2}", haversine_km(lat1, lon1, lat2, lon2) * 1000.0);
        }
        Command::Ping => {
            println!("donetogether_core ping={}", donetogether_core::ping());
            println!("donetogether_core version={}", donetogether_core::core_version());
        }
    }
    Ok(())
}

fn run_tracker<P: LocationProvider>(
    common: &CommonArgs,
    provider: &mut P,
    clock: ClockSource,
) -> Result<RunSummary> {
    let settings = load_settings(common)?;
    init_logging_from_settings(&settings).map_err(anyhow::Error::msg)?;
    let snapshot = read_plans(&common.plans)?;

    let store: Box<dyn CooldownStore + Send> = match settings.cooldown_db_path.as_ref() {
        Some(path) => Box::new(
            SqliteCooldownStore::open(path)
                .with_context(|| format!("failed to open cooldown db `{}`", path.display()))?,
        ),
        None => Box::new(InMemoryCooldownStore::new()),
    };

    let json = common.json;
    let sink = FnNotificationSink(
        move |request: &NotificationRequest| -> Result<(), DeliveryError> {
            print_notification(request, json);
            LogNotificationSink.deliver(request)
        },
    );
    let tracker = ReminderTracker::new(settings.evaluator_config(), store, sink);
    tracker.on_plans_changed(snapshot, 0);
    Ok(tracker.run(provider, clock))
}

fn load_settings(common: &CommonArgs) -> Result<ReminderSettings> {
    let mut settings = match common.settings.as_ref() {
        Some(path) => ReminderSettings::load(path)?,
        None => ReminderSettings::default(),
    };
    settings.apply_env_overrides()?;
    if let Some(path) = common.cooldown_db.as_ref() {
        settings.cooldown_db_path = Some(path.clone());
    }
    Ok(settings)
}

fn read_plans(path: &Path) -> Result<PlanSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plans `{}`", path.display()))?;
    parse_snapshot(&raw).with_context(|| format!("invalid plans JSON in `{}`", path.display()))
}

fn read_track(path: &Path) -> Result<Vec<Position>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read track `{}`", path.display()))?;
    let mut positions = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let parsed = parse_track_line(line).with_context(|| {
            format!("invalid position on line {} of `{}`", index + 1, path.display())
        })?;
        positions.extend(parsed);
    }
    Ok(positions)
}

fn parse_track_line(line: &str) -> Result<Option<Position>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

fn print_notification(request: &NotificationRequest, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "identifier": request.identifier,
                "title": request.title,
                "body": request.body,
            })
        );
    } else {
        println!("[{}] {}: {}", request.identifier, request.title, request.body);
    }
}

fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        return;
    }
    println!(
        "positions={} reminders={} delivery_failures={} provider_errors={} stop={:?}",
        summary.positions,
        summary.emitted_count(),
        summary.delivery_failure_count(),
        summary.provider_errors,
        summary.stop_reason
    );
}
