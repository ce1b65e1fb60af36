//! Recording status indicators.
//!
//! The recorder tells the indicator about every idle/recording transition.
//! Indicator trouble is logged and swallowed: a dead LCD must never block a
//! session toggle.

use anyhow::Result;
use serde::{Deserialize, Serialize};

fn default_led_line() -> u8 {
    27
}
fn default_ready_text() -> String {
    "READY".to_string()
}
fn default_recording_text() -> String {
    "RECORDING".to_string()
}

/// Indicator selection, made once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorConfig {
    /// No indicator at all.
    None,
    /// Log transitions only.
    Log,
    /// LED on a GPIO line, lit while recording.
    Led {
        #[serde(default = "default_led_line")]
        line: u8,
    },
    /// Grove-style RGB character LCD on I2C.
    Lcd {
        /// I2C bus number; the platform default bus when absent.
        #[serde(default)]
        bus: Option<u8>,
        #[serde(default = "default_ready_text")]
        ready_text: String,
        #[serde(default = "default_recording_text")]
        recording_text: String,
    },
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig::Log
    }
}

pub trait StatusIndicator: Send {
    fn recording(&mut self);
    fn idle(&mut self);
}

/// Build the configured indicator. Callers typically fall back to
/// [`LogIndicator`] when hardware is missing; see the rig binary.
pub fn build_indicator(config: &IndicatorConfig) -> Result<Box<dyn StatusIndicator>> {
    match config {
        IndicatorConfig::None => Ok(Box::new(NullIndicator)),
        IndicatorConfig::Log => Ok(Box::new(LogIndicator)),
        #[cfg(feature = "gpio")]
        IndicatorConfig::Led { line } => Ok(Box::new(LedIndicator::new(*line)?)),
        #[cfg(feature = "lcd")]
        IndicatorConfig::Lcd {
            bus,
            ready_text,
            recording_text,
        } => Ok(Box::new(LcdIndicator::new(
            *bus,
            ready_text.clone(),
            recording_text.clone(),
        )?)),
        #[cfg(not(feature = "gpio"))]
        IndicatorConfig::Led { .. } => {
            anyhow::bail!("LED indicator needs a build with the gpio feature")
        }
        #[cfg(not(feature = "lcd"))]
        IndicatorConfig::Lcd { .. } => {
            anyhow::bail!("LCD indicator needs a build with the lcd feature")
        }
    }
}

/// Does nothing.
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn recording(&mut self) {}
    fn idle(&mut self) {}
}

/// Logs transitions.
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn recording(&mut self) {
        tracing::info!("status: RECORDING");
    }
    fn idle(&mut self) {
        tracing::info!("status: idle");
    }
}

#[cfg(feature = "gpio")]
pub use led::LedIndicator;

#[cfg(feature = "gpio")]
mod led {
    use super::StatusIndicator;
    use anyhow::{Context, Result};
    use rppal::gpio::{Gpio, OutputPin};

    /// LED on a GPIO line, lit while recording.
    pub struct LedIndicator {
        pin: OutputPin,
    }

    impl LedIndicator {
        pub fn new(line: u8) -> Result<Self> {
            let gpio = Gpio::new().context("opening GPIO")?;
            let pin = gpio
                .get(line)
                .with_context(|| format!("claiming GPIO {}", line))?
                .into_output_low();
            Ok(Self { pin })
        }
    }

    impl StatusIndicator for LedIndicator {
        fn recording(&mut self) {
            self.pin.set_high();
        }
        fn idle(&mut self) {
            self.pin.set_low();
        }
    }
}

#[cfg(feature = "lcd")]
pub use lcd::LcdIndicator;

#[cfg(feature = "lcd")]
mod lcd {
    use super::StatusIndicator;
    use anyhow::{Context, Result};
    use rppal::i2c::I2c;
    use std::thread;
    use std::time::Duration;

    const RGB_ADDR: u16 = 0x60;
    const TEXT_ADDR: u16 = 0x3e;
    const REG_CMD: u8 = 0x80;
    const REG_CHAR: u8 = 0x40;
    const CMD_CLEAR: u8 = 0x01;
    const CMD_DISPLAY_ON: u8 = 0x08 | 0x04;
    const CMD_TWO_LINES: u8 = 0x28;
    const CMD_NEWLINE: u8 = 0xC0;
    const COLS: usize = 16;

    const IDLE_RGB: [u8; 3] = [0, 128, 64];
    const RECORDING_RGB: [u8; 3] = [255, 0, 0];

    /// Grove-style RGB character LCD: backlight controller at 0x60, text
    /// controller at 0x3e, two rows of sixteen.
    pub struct LcdIndicator {
        i2c: I2c,
        ready_text: String,
        recording_text: String,
    }

    impl LcdIndicator {
        pub fn new(bus: Option<u8>, ready_text: String, recording_text: String) -> Result<Self> {
            let i2c = match bus {
                Some(bus) => I2c::with_bus(bus).with_context(|| format!("opening I2C bus {}", bus))?,
                None => I2c::new().context("opening I2C")?,
            };
            Ok(Self {
                i2c,
                ready_text,
                recording_text,
            })
        }

        fn apply(&mut self, rgb: [u8; 3], text: &str) {
            if let Err(e) = self.try_apply(rgb, text) {
                tracing::warn!("LCD update failed: {}", e);
            }
        }

        fn try_apply(&mut self, rgb: [u8; 3], text: &str) -> Result<()> {
            self.i2c.set_slave_address(RGB_ADDR)?;
            self.i2c.smbus_write_byte(0, 0)?;
            self.i2c.smbus_write_byte(1, 0)?;
            self.i2c.smbus_write_byte(0x08, 0xAA)?;
            self.i2c.smbus_write_byte(4, rgb[0])?;
            self.i2c.smbus_write_byte(3, rgb[1])?;
            self.i2c.smbus_write_byte(2, rgb[2])?;

            self.i2c.set_slave_address(TEXT_ADDR)?;
            self.i2c.smbus_write_byte(REG_CMD, CMD_CLEAR)?;
            thread::sleep(Duration::from_millis(50));
            self.i2c.smbus_write_byte(REG_CMD, CMD_DISPLAY_ON)?;
            self.i2c.smbus_write_byte(REG_CMD, CMD_TWO_LINES)?;
            thread::sleep(Duration::from_millis(50));

            let mut count = 0usize;
            let mut row = 0usize;
            for ch in text.chars() {
                if ch == '\n' || count == COLS {
                    count = 0;
                    row += 1;
                    if row == 2 {
                        break;
                    }
                    self.i2c.smbus_write_byte(REG_CMD, CMD_NEWLINE)?;
                    if ch == '\n' {
                        continue;
                    }
                }
                count += 1;
                let byte = if ch.is_ascii() { ch as u8 } else { b'?' };
                self.i2c.smbus_write_byte(REG_CHAR, byte)?;
            }
            Ok(())
        }
    }

    impl StatusIndicator for LcdIndicator {
        fn recording(&mut self) {
            let text = self.recording_text.clone();
            self.apply(RECORDING_RGB, &text);
        }
        fn idle(&mut self) {
            let text = self.ready_text.clone();
            self.apply(IDLE_RGB, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_indicator_is_harmless() {
        let mut ind = LogIndicator;
        ind.recording();
        ind.idle();
        ind.idle();
    }

    #[test]
    fn test_config_defaults() {
        let led: IndicatorConfig = serde_json::from_str(r#"{"kind":"led"}"#).unwrap();
        assert!(matches!(led, IndicatorConfig::Led { line: 27 }));

        let lcd: IndicatorConfig = serde_json::from_str(r#"{"kind":"lcd"}"#).unwrap();
        match lcd {
            IndicatorConfig::Lcd {
                bus,
                ready_text,
                recording_text,
            } => {
                assert_eq!(bus, None);
                assert_eq!(ready_text, "READY");
                assert_eq!(recording_text, "RECORDING");
            }
            other => panic!("expected lcd config, got {:?}", other),
        }
    }

    #[test]
    fn test_build_log_and_null() {
        assert!(build_indicator(&IndicatorConfig::Log).is_ok());
        assert!(build_indicator(&IndicatorConfig::None).is_ok());
    }
}
