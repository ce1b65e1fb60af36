//! Rig configuration.
//!
//! One JSON file describes the whole rig: where recordings go, which trigger
//! and indicator the process uses, and the set of capture sources. Everything
//! is optional; an empty object is a valid config that records nothing on a
//! console trigger.
//!
//! ```json
//! {
//!   "label": "run",
//!   "output_root": "recordings",
//!   "trigger": { "kind": "pin", "line": 17, "poll_ms": 100 },
//!   "indicator": { "kind": "led", "line": 27 },
//!   "cameras": [
//!     {
//!       "name": "camera1",
//!       "program": "rpicam-vid",
//!       "args": ["--camera", "1", "-t", "0", "--output", "{output}"]
//!     }
//!   ],
//!   "depth": { "name": "depthcam", "device": "sim", "fps": 15 },
//!   "gps": { "port": "/dev/ttyUSB0", "baud": 9600 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::depth::DepthConfig;
use crate::gps::GpsConfig;
use crate::indicator::IndicatorConfig;
use crate::process::CameraCommand;
use crate::trigger::TriggerConfig;

fn default_label() -> String {
    "session".to_string()
}
fn default_output_root() -> PathBuf {
    PathBuf::from("recordings")
}
fn default_stop_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    /// Session label; part of every session directory name.
    #[serde(default = "default_label")]
    pub label: String,
    /// Directory that session directories are created under.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
    /// Board cameras, each one external recorder command.
    #[serde(default)]
    pub cameras: Vec<CameraCommand>,
    #[serde(default)]
    pub depth: Option<DepthConfig>,
    #[serde(default)]
    pub gps: Option<GpsConfig>,
    /// Bounded join wait for capture workers at session stop. Recorder
    /// subprocesses are terminated separately under a fixed SIGTERM grace.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            output_root: default_output_root(),
            trigger: TriggerConfig::default(),
            indicator: IndicatorConfig::default(),
            cameras: Vec::new(),
            depth: None,
            gps: None,
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl RigConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: RigConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Reject configurations that could not produce a working rig. Source
    /// names double as file stems, so they are held to filesystem-safe
    /// characters and must not collide.
    pub fn validate(&self) -> Result<()> {
        if !valid_name(&self.label) {
            bail!(
                "label {:?} must be non-empty alphanumeric/dash/underscore",
                self.label
            );
        }
        if self.stop_timeout_secs == 0 {
            bail!("stop_timeout_secs must be at least 1");
        }

        let mut names: Vec<&str> = Vec::new();
        for camera in &self.cameras {
            if !valid_name(&camera.name) {
                bail!("camera name {:?} is not filesystem-safe", camera.name);
            }
            if camera.program.is_empty() {
                bail!("camera {} has an empty program", camera.name);
            }
            names.push(&camera.name);
        }
        if let Some(depth) = &self.depth {
            if !valid_name(&depth.name) {
                bail!("depth name {:?} is not filesystem-safe", depth.name);
            }
            if depth.width == 0 || depth.height == 0 {
                bail!("depth resolution {}x{} is invalid", depth.width, depth.height);
            }
            if depth.fps == 0 {
                bail!("depth fps must be at least 1");
            }
            if depth.jpeg_quality == 0 || depth.jpeg_quality > 100 {
                bail!("depth jpeg_quality {} is out of 1-100", depth.jpeg_quality);
            }
            names.push(&depth.name);
        }
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            bail!("duplicate source name {:?}", pair[0]);
        }

        if let Some(gps) = &self.gps {
            if gps.port.is_empty() {
                bail!("gps port is empty");
            }
            if gps.baud == 0 {
                bail!("gps baud must be at least 1");
            }
            #[cfg(not(feature = "serial"))]
            bail!("gps is configured but this build lacks the serial feature");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_valid() {
        let config: RigConfig = serde_json::from_str("{}").unwrap();
        config.validate().unwrap();
        assert_eq!(config.label, "session");
        assert_eq!(config.output_root, PathBuf::from("recordings"));
        assert!(config.cameras.is_empty());
        assert!(config.depth.is_none());
        assert_eq!(config.stop_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_config_parses() {
        let config: RigConfig = serde_json::from_str(
            r#"{
                "label": "run",
                "output_root": "/data/recordings",
                "trigger": { "kind": "pin", "line": 17 },
                "indicator": { "kind": "none" },
                "cameras": [
                    { "name": "camera1", "program": "rpicam-vid",
                      "args": ["--camera", "1", "--output", "{output}"] },
                    { "name": "camera2", "program": "rpicam-vid",
                      "args": ["--output", "{output}"] }
                ],
                "depth": { "name": "depthcam", "fps": 15 },
                "stop_timeout_secs": 5
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0].extension, "h264");
        let depth = config.depth.unwrap();
        assert_eq!(depth.device, "sim");
        assert_eq!(depth.width, 1920);
    }

    #[test]
    fn test_bad_label_rejected() {
        let mut config = RigConfig::default();
        config.label = "has space".to_string();
        assert!(config.validate().is_err());
        config.label = String::new();
        assert!(config.validate().is_err());
        config.label = "../escape".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_source_names_rejected() {
        let config: RigConfig = serde_json::from_str(
            r#"{
                "cameras": [
                    { "name": "cam", "program": "rpicam-vid" },
                    { "name": "cam", "program": "rpicam-vid" }
                ]
            }"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate"), "{}", err);
    }

    #[test]
    fn test_depth_name_colliding_with_camera_rejected() {
        let config: RigConfig = serde_json::from_str(
            r#"{
                "cameras": [{ "name": "depthcam", "program": "rpicam-vid" }],
                "depth": { "name": "depthcam" }
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rates_rejected() {
        let config: RigConfig =
            serde_json::from_str(r#"{"depth": {"fps": 0}}"#).unwrap();
        assert!(config.validate().is_err());
        let config: RigConfig =
            serde_json::from_str(r#"{"stop_timeout_secs": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn test_gps_needs_serial_feature() {
        let config: RigConfig =
            serde_json::from_str(r#"{"gps": {"port": "/dev/ttyUSB0"}}"#).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("serial feature"), "{}", err);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(RigConfig::load(Path::new("/nonexistent/rig.json")).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.json");
        std::fs::write(&path, r#"{"label": "bench"}"#).unwrap();
        let config = RigConfig::load(&path).unwrap();
        assert_eq!(config.label, "bench");
    }
}
