//! Capture source dispatch.
//!
//! A session deals with sources through two enums: [`SourceConfig`] is the
//! static description, [`ActiveSource`] the started handle (child process or
//! worker). Dispatch is a plain match per kind; sources have too little in
//! common for a trait to pay for itself.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::RigConfig;
use crate::depth::{DepthConfig, DepthHandle, DepthSource};
use crate::gps::GpsConfig;
use crate::process::{CameraCommand, CameraProcess};

/// File stem of the GPS sample log.
pub const GPS_SOURCE_NAME: &str = "gps";

/// One configured capture source, startable once per session.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    /// External recorder subprocess (board camera).
    Camera(CameraCommand),
    /// Depth/IMU module on a capture worker thread.
    Depth(DepthConfig),
    /// GPS receiver on a serial port.
    Gps(GpsConfig),
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Camera(camera) => &camera.name,
            SourceConfig::Depth(depth) => &depth.name,
            SourceConfig::Gps(_) => GPS_SOURCE_NAME,
        }
    }

    /// Start this source for the session identified by `timestamp`, writing
    /// under `dir`. Threaded sources observe `cancel`; the subprocess source
    /// is stopped by signal instead.
    pub async fn start(
        &self,
        dir: &Path,
        timestamp: &str,
        cancel: &CancellationToken,
    ) -> Result<ActiveSource> {
        match self {
            SourceConfig::Camera(camera) => {
                Ok(ActiveSource::Camera(camera.start(dir, timestamp).await?))
            }
            SourceConfig::Depth(depth) => {
                let source = DepthSource::from_config(depth)?;
                Ok(ActiveSource::Depth(source.start(dir, timestamp, cancel)?))
            }
            #[cfg(feature = "serial")]
            SourceConfig::Gps(gps) => {
                let path = dir.join(format!("{}_{}.json", GPS_SOURCE_NAME, timestamp));
                Ok(ActiveSource::Gps(crate::gps::start_gps_capture(
                    gps,
                    &path,
                    cancel.clone(),
                )?))
            }
            #[cfg(not(feature = "serial"))]
            SourceConfig::Gps(_) => {
                anyhow::bail!("GPS capture needs a build with the serial feature")
            }
        }
    }
}

/// The source list a rig config describes: board cameras first, then the
/// depth module, then GPS.
pub fn sources_from_config(config: &RigConfig) -> Vec<SourceConfig> {
    let mut sources: Vec<SourceConfig> = config
        .cameras
        .iter()
        .cloned()
        .map(SourceConfig::Camera)
        .collect();
    if let Some(depth) = &config.depth {
        sources.push(SourceConfig::Depth(depth.clone()));
    }
    if let Some(gps) = &config.gps {
        sources.push(SourceConfig::Gps(gps.clone()));
    }
    sources
}

/// A started capture source, owned by the active session.
pub enum ActiveSource {
    Camera(CameraProcess),
    Depth(DepthHandle),
    #[cfg(feature = "serial")]
    Gps(crate::gps::GpsHandle),
}

impl ActiveSource {
    pub fn name(&self) -> &str {
        match self {
            ActiveSource::Camera(process) => process.name(),
            ActiveSource::Depth(handle) => handle.name(),
            #[cfg(feature = "serial")]
            ActiveSource::Gps(_) => GPS_SOURCE_NAME,
        }
    }

    /// Stop this source: terminate-and-wait for the subprocess, bounded join
    /// for workers (the session token must already be cancelled). Returns
    /// false when the source had to be abandoned.
    pub async fn stop(self, timeout: Duration) -> bool {
        match self {
            ActiveSource::Camera(process) => {
                let name = process.name().to_string();
                match process.stop().await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("[{}] recorder stop failed: {}", name, e);
                        false
                    }
                }
            }
            ActiveSource::Depth(handle) => handle.join(timeout).await.is_some(),
            #[cfg(feature = "serial")]
            ActiveSource::Gps(handle) => handle.join(timeout).await.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CameraCommand;

    fn depth_config() -> DepthConfig {
        DepthConfig {
            width: 64,
            height: 48,
            ..DepthConfig::default()
        }
    }

    #[test]
    fn test_source_names() {
        let camera = SourceConfig::Camera(CameraCommand {
            name: "camera1".to_string(),
            program: "rpicam-vid".to_string(),
            args: vec![],
            extension: "h264".to_string(),
        });
        assert_eq!(camera.name(), "camera1");
        assert_eq!(SourceConfig::Depth(depth_config()).name(), "depthcam");
        assert_eq!(
            SourceConfig::Gps(GpsConfig::new("/dev/ttyUSB0")).name(),
            "gps"
        );
    }

    #[test]
    fn test_sources_from_config_order() {
        let config: RigConfig = serde_json::from_str(
            r#"{
                "cameras": [
                    { "name": "camera1", "program": "rpicam-vid" },
                    { "name": "camera2", "program": "rpicam-vid" }
                ],
                "depth": {}
            }"#,
        )
        .unwrap();
        let sources = sources_from_config(&config);
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["camera1", "camera2", "depthcam"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_depth_dispatch_start_stop() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let source = SourceConfig::Depth(depth_config());
        let active = source
            .start(dir.path(), "20240229_120000", &cancel)
            .await
            .unwrap();
        assert_eq!(active.name(), "depthcam");
        cancel.cancel();
        assert!(active.stop(Duration::from_secs(5)).await);
        assert!(dir.path().join("depthcam_20240229_120000.avi").exists());
    }

    #[cfg(not(feature = "serial"))]
    #[tokio::test]
    async fn test_gps_without_serial_feature_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let source = SourceConfig::Gps(GpsConfig::new("/dev/ttyUSB0"));
        let err = match source.start(dir.path(), "20240229_120000", &cancel).await {
            Ok(_) => panic!("GPS start succeeded without the serial feature"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("serial feature"), "{}", err);
    }
}
