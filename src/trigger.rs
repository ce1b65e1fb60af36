//! Trigger sources: whatever flips the rig between recording and idle.
//!
//! Exactly one variant runs per process, selected by configuration. All of
//! them deliver into a capacity-one channel: triggers are never queued, and
//! a press that lands while a toggle is still in flight simply becomes the
//! next toggle.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "gpio")]
use std::time::Duration;

fn default_line() -> u8 {
    17
}
fn default_poll_ms() -> u64 {
    100
}

/// Trigger selection, made once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// An empty line on stdin toggles.
    Console,
    /// Poll a GPIO line and fire on each high-to-low transition.
    Pin {
        #[serde(default = "default_line")]
        line: u8,
        #[serde(default = "default_poll_ms")]
        poll_ms: u64,
    },
    /// Interrupt-driven button on a GPIO line.
    Button {
        #[serde(default = "default_line")]
        line: u8,
    },
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::Console
    }
}

/// Falling-edge detector over sampled levels.
pub struct EdgeDetector {
    last_high: bool,
}

impl EdgeDetector {
    /// Lines idle high behind a pull-up; a sampled low fires once.
    pub fn new() -> Self {
        Self { last_high: true }
    }

    /// Feed the current level; true when a high-to-low edge fired.
    pub fn sample(&mut self, high: bool) -> bool {
        let fired = self.last_high && !high;
        self.last_high = high;
        fired
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn is_toggle_line(line: &str) -> bool {
    line.trim().is_empty()
}

/// Start the configured trigger source. Toggle events land in the returned
/// channel; at most one is pending at a time, extras are dropped.
pub fn start_trigger(
    config: &TriggerConfig,
    cancel: &CancellationToken,
) -> Result<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel(1);
    match config {
        TriggerConfig::Console => {
            tokio::spawn(console_loop(tx, cancel.clone()));
        }
        #[cfg(feature = "gpio")]
        TriggerConfig::Pin { line, poll_ms } => {
            let pin = gpio_input(*line)?;
            tracing::info!("polling GPIO {} every {} ms", line, poll_ms);
            tokio::spawn(pin_poll_loop(pin, *poll_ms, tx, cancel.clone()));
        }
        #[cfg(feature = "gpio")]
        TriggerConfig::Button { line } => {
            let mut pin = gpio_input(*line)?;
            pin.set_async_interrupt(
                rppal::gpio::Trigger::FallingEdge,
                Some(Duration::from_millis(BUTTON_DEBOUNCE_MS)),
                move |_event| {
                    let _ = tx.try_send(());
                },
            )?;
            tracing::info!("button trigger on GPIO {}", line);
            // The interrupt stays registered for as long as the pin lives.
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                drop(pin);
            });
        }
        #[cfg(not(feature = "gpio"))]
        TriggerConfig::Pin { .. } | TriggerConfig::Button { .. } => {
            anyhow::bail!("GPIO triggers need a build with the gpio feature")
        }
    }
    Ok(rx)
}

async fn console_loop(tx: mpsc::Sender<()>, cancel: CancellationToken) {
    use tokio::io::AsyncBufReadExt;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("console trigger ready: press Enter to toggle recording");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if is_toggle_line(&line) => {
                    let _ = tx.try_send(());
                }
                Ok(Some(_)) => tracing::debug!("ignoring non-empty console line"),
                Ok(None) => {
                    tracing::info!("stdin closed, console trigger stopping");
                    break;
                }
                Err(e) => {
                    tracing::warn!("console read error: {}", e);
                    break;
                }
            },
        }
    }
}

#[cfg(feature = "gpio")]
const BUTTON_DEBOUNCE_MS: u64 = 50;

#[cfg(feature = "gpio")]
fn gpio_input(line: u8) -> Result<rppal::gpio::InputPin> {
    use anyhow::Context;
    let gpio = rppal::gpio::Gpio::new().context("opening GPIO")?;
    let pin = gpio
        .get(line)
        .with_context(|| format!("claiming GPIO {}", line))?;
    Ok(pin.into_input_pullup())
}

#[cfg(feature = "gpio")]
async fn pin_poll_loop(
    pin: rppal::gpio::InputPin,
    poll_ms: u64,
    tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let mut edge = EdgeDetector::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if edge.sample(pin.is_high()) {
                    let _ = tx.try_send(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_fires_on_high_to_low() {
        let mut edge = EdgeDetector::new();
        assert!(!edge.sample(true));
        assert!(edge.sample(false));
        // Held low: no repeat fire.
        assert!(!edge.sample(false));
        // Released, pressed again.
        assert!(!edge.sample(true));
        assert!(edge.sample(false));
    }

    #[test]
    fn test_edge_fires_if_low_at_startup() {
        // A line already low on the first sample counts as an edge.
        let mut edge = EdgeDetector::new();
        assert!(edge.sample(false));
    }

    #[test]
    fn test_toggle_line_is_empty_line() {
        assert!(is_toggle_line(""));
        assert!(is_toggle_line("   \r"));
        assert!(!is_toggle_line("stop"));
    }

    #[test]
    fn test_config_tags() {
        let pin: TriggerConfig = serde_json::from_str(r#"{"kind":"pin"}"#).unwrap();
        match pin {
            TriggerConfig::Pin { line, poll_ms } => {
                assert_eq!(line, 17);
                assert_eq!(poll_ms, 100);
            }
            other => panic!("expected pin config, got {:?}", other),
        }
        let console: TriggerConfig = serde_json::from_str(r#"{"kind":"console"}"#).unwrap();
        assert!(matches!(console, TriggerConfig::Console));
        let button: TriggerConfig =
            serde_json::from_str(r#"{"kind":"button","line":22}"#).unwrap();
        assert!(matches!(button, TriggerConfig::Button { line: 22 }));
    }

    #[tokio::test]
    async fn test_pending_triggers_not_queued() {
        // The channel holds one pending toggle; a burst collapses into it.
        let (tx, mut rx) = mpsc::channel::<()>(1);
        assert!(tx.try_send(()).is_ok());
        assert!(tx.try_send(()).is_err());
        assert!(tx.try_send(()).is_err());
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
