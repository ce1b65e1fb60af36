//! Recording rig coordinator — one trigger toggles every configured capture
//! source between idle and recording.
//!
//! Board cameras run as external recorder subprocesses, the depth/IMU module
//! records on a worker thread, GPS sentences stream to a JSON log. All files
//! of a session share one timestamp under one session directory.
//!
//! Usage:
//!   rigrec [label] [options]
//!
//! Options:
//!   --config <file>         Load rig config JSON
//!   --output-dir <dir>      Override the configured output root
//!   --action start|stop     start: begin recording immediately, exit when the
//!                           session ends; stop: validate the config and exit
//!   --duration <seconds>    Auto-stop each session after N seconds
//!   --verbose               Debug logging

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use rigrec::indicator::LogIndicator;
use rigrec::{build_indicator, sources_from_config, Recorder, RigConfig, SessionSummary};

#[derive(Clone, Copy, PartialEq)]
enum Action {
    Interactive,
    Start,
    Stop,
}

struct Args {
    label: Option<String>,
    config_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    action: Action,
    duration_secs: Option<u64>,
    verbose: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut label = None;
    let mut config_path = None;
    let mut output_dir = None;
    let mut action = Action::Interactive;
    let mut duration_secs = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--output-dir" if i + 1 < args.len() => {
                output_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--action" if i + 1 < args.len() => {
                action = match args[i + 1].as_str() {
                    "start" => Action::Start,
                    "stop" => Action::Stop,
                    other => {
                        eprintln!("Unknown action {:?} (expected start or stop)", other);
                        std::process::exit(2);
                    }
                };
                i += 2;
            }
            "--duration" if i + 1 < args.len() => {
                duration_secs = args[i + 1].parse().ok();
                i += 2;
            }
            "--verbose" => {
                verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg if !arg.starts_with("--") && label.is_none() => {
                label = Some(arg.to_string());
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    Args {
        label,
        config_path,
        output_dir,
        action,
        duration_secs,
        verbose,
    }
}

fn print_usage() {
    println!("Recording rig coordinator — toggles every capture source between idle and recording");
    println!();
    println!("Usage: rigrec [label] [options]");
    println!();
    println!("Options:");
    println!("  --config <file>         Load rig config JSON");
    println!("  --output-dir <dir>      Override the configured output root");
    println!("  --action start|stop     start: begin recording immediately, exit when the");
    println!("                          session ends; stop: validate the config and exit");
    println!("  --duration <seconds>    Auto-stop each session after N seconds");
    println!("  --verbose               Debug logging");
    println!();
    println!("Examples:");
    println!("  rigrec --config rig.json");
    println!("  rigrec run42 --config rig.json --action start --duration 60");
    println!("  rigrec --config rig.json --output-dir /data/recordings");
}

fn trigger_description(config: &RigConfig) -> String {
    use rigrec::trigger::TriggerConfig;
    match &config.trigger {
        TriggerConfig::Console => "console (Enter toggles)".to_string(),
        TriggerConfig::Pin { line, poll_ms } => {
            format!("GPIO {} polled every {} ms", line, poll_ms)
        }
        TriggerConfig::Button { line } => format!("button on GPIO {}", line),
    }
}

fn print_session_summary(summary: &SessionSummary) {
    println!();
    println!("========================================");
    println!("Session {} complete", summary.info.timestamp);
    println!("========================================");
    let mut entries: Vec<(PathBuf, u64)> = Vec::new();
    match std::fs::read_dir(&summary.info.dir) {
        Ok(dir) => {
            for entry in dir.flatten() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                entries.push((entry.path(), size));
            }
        }
        Err(e) => println!("  (session directory unreadable: {})", e),
    }
    entries.sort();
    for (path, size) in &entries {
        if *size >= 1_048_576 {
            println!("  {} ({:.1} MB)", path.display(), *size as f64 / 1_048_576.0);
        } else {
            println!("  {} ({:.1} KB)", path.display(), *size as f64 / 1024.0);
        }
    }
    println!(
        "Sources:    {}/{} stopped clean",
        summary.sources_clean, summary.sources_started
    );
    println!("Duration:   {:.1}s", summary.elapsed.as_secs_f64());
    println!("========================================");
    println!();
}

/// Pending session deadline; never resolves while no deadline is armed.
async fn deadline_elapsed(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "info" })
            }),
        )
        .init();

    let mut config = match &args.config_path {
        Some(path) => RigConfig::load(path)?,
        None => RigConfig::default(),
    };
    if let Some(label) = &args.label {
        config.label = label.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_root = dir.clone();
    }
    config.validate()?;

    if args.action == Action::Stop {
        // Sessions end on trigger, duration or Ctrl+C; a fresh process has
        // nothing to stop. Kept for wrapper-script symmetry with start.
        println!("Configuration valid; no active session in a fresh process");
        return Ok(());
    }

    let source_names: Vec<String> = sources_from_config(&config)
        .iter()
        .map(|s| s.name().to_string())
        .collect();

    println!();
    println!("========================================");
    println!("Recording Rig");
    println!("========================================");
    println!("Label:      {}", config.label);
    println!("Output:     {}", config.output_root.display());
    println!("Trigger:    {}", trigger_description(&config));
    if source_names.is_empty() {
        println!("Sources:    (none configured)");
    } else {
        println!("Sources:    {}", source_names.join(", "));
    }
    match args.duration_secs {
        Some(secs) => println!("Duration:   {}s per session", secs),
        None => println!("Duration:   until toggle"),
    }
    println!("========================================");
    println!();

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received, shutting down");
        ctrl_c_cancel.cancel();
    });

    let indicator: Box<dyn rigrec::StatusIndicator> = match build_indicator(&config.indicator) {
        Ok(indicator) => indicator,
        Err(e) => {
            tracing::warn!("indicator unavailable, falling back to log: {:#}", e);
            Box::new(LogIndicator)
        }
    };
    let mut triggers = rigrec::start_trigger(&config.trigger, &cancel)?;
    let mut recorder = Recorder::from_config(&config, indicator);

    let session_limit = args.duration_secs.map(Duration::from_secs);
    let mut deadline: Option<tokio::time::Instant> = None;
    let one_shot = args.action == Action::Start;

    if one_shot {
        recorder.toggle().await?;
        deadline = session_limit.map(|limit| tokio::time::Instant::now() + limit);
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = deadline_elapsed(deadline) => {
                tracing::info!("session duration limit reached");
                deadline = None;
                if let Some(summary) = recorder.stop_if_active().await {
                    print_session_summary(&summary);
                }
                if one_shot {
                    break;
                }
            }
            event = triggers.recv() => match event {
                Some(()) => match recorder.toggle().await {
                    Ok(Some(summary)) => {
                        deadline = None;
                        print_session_summary(&summary);
                        if one_shot {
                            break;
                        }
                    }
                    Ok(None) => {
                        deadline = session_limit
                            .map(|limit| tokio::time::Instant::now() + limit);
                    }
                    Err(e) => tracing::error!("session start failed: {:#}", e),
                },
                None => {
                    tracing::info!("trigger source ended");
                    break;
                }
            },
        }
    }

    // Orderly shutdown of whatever is still recording.
    if let Some(summary) = recorder.stop_if_active().await {
        print_session_summary(&summary);
    }
    println!("{} session(s) recorded", recorder.sessions_recorded());
    Ok(())
}
