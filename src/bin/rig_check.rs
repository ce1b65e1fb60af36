//! Rig bring-up check — walks the configuration and reports, per component,
//! whether it can be opened. Nothing is recorded.
//!
//! Usage: rig-check [options]
//!
//! Options:
//!   --config <file>     Load rig config JSON (default config otherwise)
//!   --verbose           Debug logging
//!
//! Exit code is 1 when any component fails.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use rigrec::build_indicator;
use rigrec::depth::DepthSource;
use rigrec::indicator::IndicatorConfig;
use rigrec::trigger::TriggerConfig;
use rigrec::RigConfig;

enum Status {
    Ok,
    Fail,
    /// Named by the config but untestable in this build.
    #[allow(dead_code)]
    Skip,
}

struct Check {
    component: String,
    status: Status,
    detail: String,
}

impl Check {
    fn ok(component: &str, detail: String) -> Self {
        Self {
            component: component.to_string(),
            status: Status::Ok,
            detail,
        }
    }
    fn fail(component: &str, detail: String) -> Self {
        Self {
            component: component.to_string(),
            status: Status::Fail,
            detail,
        }
    }
    #[allow(dead_code)]
    fn skip(component: &str, detail: String) -> Self {
        Self {
            component: component.to_string(),
            status: Status::Skip,
            detail,
        }
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Resolve a recorder program the way the shell would.
fn find_program(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn check_output_root(root: &Path) -> Check {
    match std::fs::create_dir_all(root) {
        Ok(()) => Check::ok("output root", root.display().to_string()),
        Err(e) => Check::fail("output root", format!("{}: {}", root.display(), e)),
    }
}

fn check_trigger(config: &TriggerConfig) -> Check {
    match config {
        TriggerConfig::Console => Check::ok("trigger", "console (Enter toggles)".to_string()),
        #[cfg(feature = "gpio")]
        TriggerConfig::Pin { line, poll_ms } => match claim_gpio_line(*line) {
            Ok(()) => Check::ok(
                "trigger",
                format!("GPIO {} claimed (poll every {} ms)", line, poll_ms),
            ),
            Err(e) => Check::fail("trigger", format!("GPIO {}: {:#}", line, e)),
        },
        #[cfg(feature = "gpio")]
        TriggerConfig::Button { line } => match claim_gpio_line(*line) {
            Ok(()) => Check::ok("trigger", format!("button GPIO {} claimed", line)),
            Err(e) => Check::fail("trigger", format!("GPIO {}: {:#}", line, e)),
        },
        #[cfg(not(feature = "gpio"))]
        TriggerConfig::Pin { .. } | TriggerConfig::Button { .. } => {
            Check::fail("trigger", "build lacks the gpio feature".to_string())
        }
    }
}

#[cfg(feature = "gpio")]
fn claim_gpio_line(line: u8) -> Result<()> {
    let gpio = rppal::gpio::Gpio::new()?;
    let _pin = gpio.get(line)?.into_input_pullup();
    Ok(())
}

fn check_config(config: &RigConfig) -> Check {
    match config.validate() {
        Ok(()) => Check::ok("config", "valid".to_string()),
        Err(e) => Check::fail("config", format!("{:#}", e)),
    }
}

fn check_indicator(config: &IndicatorConfig) -> Check {
    match build_indicator(config) {
        Ok(mut indicator) => {
            indicator.idle();
            Check::ok("indicator", "shows idle".to_string())
        }
        Err(e) => Check::fail("indicator", format!("{:#}", e)),
    }
}

async fn check_depth(config: &RigConfig) -> Option<Check> {
    let depth = config.depth.as_ref()?;
    let name = depth.name.clone();
    let source = match DepthSource::from_config(depth) {
        Ok(source) => source,
        Err(e) => return Some(Check::fail(&name, format!("{:#}", e))),
    };
    let probed = tokio::task::spawn_blocking(move || source.probe(Duration::from_secs(2))).await;
    Some(match probed {
        Ok(Ok(())) => Check::ok(&name, format!("{} device delivered a frame", depth.device)),
        Ok(Err(e)) => Check::fail(&name, format!("{:#}", e)),
        Err(e) => Check::fail(&name, format!("probe task failed: {}", e)),
    })
}

fn check_gps(config: &RigConfig) -> Option<Check> {
    let gps = config.gps.as_ref()?;
    #[cfg(feature = "serial")]
    {
        use tokio_serial::SerialPortBuilderExt;
        Some(
            match tokio_serial::new(&gps.port, gps.baud).open_native_async() {
                Ok(_port) => Check::ok("gps", format!("{} at {} baud", gps.port, gps.baud)),
                Err(e) => Check::fail("gps", format!("{}: {}", gps.port, e)),
            },
        )
    }
    #[cfg(not(feature = "serial"))]
    {
        Some(Check::skip(
            "gps",
            format!("{} unchecked, build lacks the serial feature", gps.port),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut verbose = false;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--verbose" => {
                verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: rig-check [--config <file>] [--verbose]");
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "warn" })
            }),
        )
        .init();

    // Parsed but not hard-validated: a bad component becomes a FAIL row
    // instead of aborting the walk.
    let config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<RigConfig>(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => RigConfig::default(),
    };

    let mut checks: Vec<Check> = Vec::new();
    checks.push(check_config(&config));
    checks.push(check_output_root(&config.output_root));
    checks.push(check_trigger(&config.trigger));
    checks.push(check_indicator(&config.indicator));
    for camera in &config.cameras {
        checks.push(match find_program(&camera.program) {
            Some(path) => Check::ok(&camera.name, format!("{} -> {}", camera.program, path.display())),
            None => Check::fail(&camera.name, format!("{} not found", camera.program)),
        });
    }
    if let Some(check) = check_depth(&config).await {
        checks.push(check);
    }
    if let Some(check) = check_gps(&config) {
        checks.push(check);
    }

    println!();
    println!("========================================");
    println!("Rig Check");
    println!("========================================");
    let width = checks
        .iter()
        .map(|c| c.component.len())
        .max()
        .unwrap_or(0);
    let mut ok = 0;
    let mut failed = 0;
    let mut skipped = 0;
    for check in &checks {
        let tag = match check.status {
            Status::Ok => {
                ok += 1;
                "OK  "
            }
            Status::Fail => {
                failed += 1;
                "FAIL"
            }
            Status::Skip => {
                skipped += 1;
                "SKIP"
            }
        };
        println!(
            "{:width$}  {}  {}",
            check.component,
            tag,
            check.detail,
            width = width
        );
    }
    println!("========================================");
    if skipped > 0 {
        println!("{} ok, {} failed, {} skipped", ok, failed, skipped);
    } else {
        println!("{} ok, {} failed", ok, failed);
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
