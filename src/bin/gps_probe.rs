//! GPS bring-up probe — opens the receiver's serial port and prints every
//! classified sentence as one JSON line, for a bounded time.
//!
//! Usage: gps-probe <port> [baud] [OPTIONS]
//!
//! Options:
//!   --duration <seconds>   Stop after N seconds (default: 10)
//!   --raw                  Also print sentences classified as RAW
//!
//! Examples:
//!   gps-probe /dev/ttyUSB0
//!   gps-probe /dev/ttyAMA0 9600 --duration 30 --raw

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

use rigrec::gps::{classify_sentence, GpsRecord};
use rigrec::time::unix_time;

struct Args {
    port: String,
    baud: u32,
    duration_secs: u64,
    raw: bool,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        return None;
    }

    let mut port = None;
    let mut baud = 9600u32;
    let mut duration_secs = 10u64;
    let mut raw = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--duration" if i + 1 < args.len() => {
                duration_secs = args[i + 1].parse().ok()?;
                i += 2;
            }
            "--raw" => {
                raw = true;
                i += 1;
            }
            "--help" | "-h" => return None,
            arg => {
                if port.is_none() {
                    port = Some(arg.to_string());
                } else if let Ok(rate) = arg.parse::<u32>() {
                    baud = rate;
                }
                i += 1;
            }
        }
    }

    Some(Args {
        port: port?,
        baud,
        duration_secs,
        raw,
    })
}

fn print_usage() {
    println!("Usage: gps-probe <port> [baud] [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --duration <seconds>   Stop after N seconds (default: 10)");
    println!("  --raw                  Also print sentences classified as RAW");
    println!();
    println!("Examples:");
    println!("  gps-probe /dev/ttyUSB0");
    println!("  gps-probe /dev/ttyAMA0 9600 --duration 30 --raw");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Some(args) => args,
        None => {
            print_usage();
            return Ok(());
        }
    };

    let stream = tokio_serial::new(&args.port, args.baud)
        .open_native_async()
        .with_context(|| format!("opening {}", args.port))?;
    println!(
        "Listening on {} at {} baud for {}s (Ctrl+C to stop)",
        args.port, args.baud, args.duration_secs
    );

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl_c_cancel.cancel();
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.duration_secs);
    let mut reader = BufReader::new(stream);
    let mut buf: Vec<u8> = Vec::new();
    let mut classified = 0u64;
    let mut raw_count = 0u64;

    loop {
        buf.clear();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => break,
            result = reader.read_until(b'\n', &mut buf) => match result {
                Ok(0) => {
                    tracing::warn!("port EOF, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if let Some(record) = classify_sentence(&line, unix_time()) {
                        let is_raw = matches!(record, GpsRecord::Raw { .. });
                        if is_raw {
                            raw_count += 1;
                        } else {
                            classified += 1;
                        }
                        if !is_raw || args.raw {
                            println!("{}", serde_json::to_string(&record)?);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    tracing::warn!("read error (retrying): {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            },
        }
    }

    println!(
        "{} classified sentences, {} other ($-prefixed but unrecognized)",
        classified, raw_count
    );
    Ok(())
}
