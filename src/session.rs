//! Session coordination.
//!
//! The [`Recorder`] owns the rig's recording/idle state. A toggle while idle
//! assigns a session timestamp, creates the session directory and starts
//! every configured source; a toggle while recording cancels the session
//! token, joins the workers within a bounded timeout and terminates the
//! subprocess sources. The recording flag is the presence of the active
//! [`Session`] value, so flag and live handles cannot disagree.
//!
//! Source failures never abort a session: a source that cannot start is
//! logged and skipped, and the rest record on.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::RigConfig;
use crate::indicator::StatusIndicator;
use crate::source::{sources_from_config, ActiveSource, SourceConfig};
use crate::time::session_timestamp;

/// Identity of one recording interval.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub label: String,
    /// `YYYYMMDD_HHMMSS`, shared by every file of the session.
    pub timestamp: String,
    /// Session directory, `<output_root>/<label>_<timestamp>`.
    pub dir: PathBuf,
}

/// One active recording interval: the session identity plus every started
/// handle. Created on the start toggle, consumed on the stop toggle.
pub struct Session {
    info: SessionInfo,
    cancel: CancellationToken,
    sources: Vec<ActiveSource>,
    began: Instant,
}

impl Session {
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// What a finished session looked like.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub info: SessionInfo,
    /// Sources that actually started (configured minus start failures).
    pub sources_started: usize,
    /// Sources that stopped within the bounded wait.
    pub sources_clean: usize,
    pub elapsed: Duration,
}

/// The rig coordinator: flips between idle and recording on [`toggle`].
///
/// [`toggle`]: Recorder::toggle
pub struct Recorder {
    label: String,
    output_root: PathBuf,
    sources: Vec<SourceConfig>,
    stop_timeout: Duration,
    indicator: Box<dyn StatusIndicator>,
    active: Option<Session>,
    sessions_recorded: u64,
}

impl Recorder {
    /// The indicator shows idle as soon as the recorder exists.
    pub fn new(
        label: &str,
        output_root: &Path,
        sources: Vec<SourceConfig>,
        stop_timeout: Duration,
        mut indicator: Box<dyn StatusIndicator>,
    ) -> Self {
        indicator.idle();
        Self {
            label: label.to_string(),
            output_root: output_root.to_path_buf(),
            sources,
            stop_timeout,
            indicator,
            active: None,
            sessions_recorded: 0,
        }
    }

    pub fn from_config(config: &RigConfig, indicator: Box<dyn StatusIndicator>) -> Self {
        Self::new(
            &config.label,
            &config.output_root,
            sources_from_config(config),
            config.stop_timeout(),
            indicator,
        )
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    pub fn sessions_recorded(&self) -> u64 {
        self.sessions_recorded
    }

    /// Flip between idle and recording. Returns the summary of the session
    /// that just ended, `None` when one just began. Fails only when the
    /// session directory cannot be created; in that case the recorder stays
    /// idle.
    pub async fn toggle(&mut self) -> Result<Option<SessionSummary>> {
        if self.active.is_some() {
            Ok(self.stop_session().await)
        } else {
            self.start_session().await?;
            Ok(None)
        }
    }

    /// Stop the active session if there is one. Used for orderly shutdown on
    /// interrupt and for the session duration limit.
    pub async fn stop_if_active(&mut self) -> Option<SessionSummary> {
        self.stop_session().await
    }

    async fn start_session(&mut self) -> Result<()> {
        let timestamp = session_timestamp();
        let dir = self
            .output_root
            .join(format!("{}_{}", self.label, timestamp));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating session directory {}", dir.display()))?;

        let cancel = CancellationToken::new();
        let mut started: Vec<ActiveSource> = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.start(&dir, &timestamp, &cancel).await {
                Ok(active) => started.push(active),
                Err(e) => {
                    tracing::error!(
                        "[{}] start failed, session continues without it: {:#}",
                        source.name(),
                        e
                    );
                }
            }
        }

        self.indicator.recording();
        tracing::info!(
            "session {} recording: {} of {} sources in {}",
            timestamp,
            started.len(),
            self.sources.len(),
            dir.display()
        );
        self.active = Some(Session {
            info: SessionInfo {
                label: self.label.clone(),
                timestamp,
                dir,
            },
            cancel,
            sources: started,
            began: Instant::now(),
        });
        Ok(())
    }

    async fn stop_session(&mut self) -> Option<SessionSummary> {
        let Session {
            info,
            cancel,
            sources,
            began,
        } = self.active.take()?;

        // Cancel before the first join so every worker sees the stop flag.
        cancel.cancel();
        let sources_started = sources.len();
        let mut sources_clean = 0;
        for source in sources {
            let name = source.name().to_string();
            if source.stop(self.stop_timeout).await {
                sources_clean += 1;
            } else {
                tracing::warn!("[{}] did not stop cleanly", name);
            }
        }

        self.indicator.idle();
        self.sessions_recorded += 1;
        let elapsed = began.elapsed();
        tracing::info!(
            "session {} stopped after {:.1}s ({}/{} sources clean)",
            info.timestamp,
            elapsed.as_secs_f64(),
            sources_clean,
            sources_started
        );
        Some(SessionSummary {
            info,
            sources_started,
            sources_clean,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::DepthConfig;
    use crate::indicator::NullIndicator;
    use crate::process::CameraCommand;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingIndicator {
        recording: Arc<AtomicUsize>,
        idle: Arc<AtomicUsize>,
    }

    impl StatusIndicator for CountingIndicator {
        fn recording(&mut self) {
            self.recording.fetch_add(1, Ordering::SeqCst);
        }
        fn idle(&mut self) {
            self.idle.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn empty_recorder(label: &str, root: &Path) -> Recorder {
        Recorder::new(
            label,
            root,
            Vec::new(),
            Duration::from_secs(5),
            Box::new(NullIndicator),
        )
    }

    fn shell_camera(name: &str) -> CameraCommand {
        // Stands in for the external recorder: creates its output file, then
        // waits for SIGTERM like rpicam-vid would.
        CameraCommand {
            name: name.to_string(),
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo started > {output}; exec sleep 30".to_string(),
            ],
            extension: "h264".to_string(),
        }
    }

    fn small_depth() -> DepthConfig {
        DepthConfig {
            width: 64,
            height: 48,
            fps: 30,
            ..DepthConfig::default()
        }
    }

    #[tokio::test]
    async fn test_toggle_parity() {
        let root = tempfile::tempdir().unwrap();
        let mut recorder = empty_recorder("parity", root.path());
        assert!(!recorder.is_recording());
        for round in 0..3 {
            recorder.toggle().await.unwrap();
            assert!(recorder.is_recording(), "round {} odd toggle", round);
            recorder.toggle().await.unwrap();
            assert!(!recorder.is_recording(), "round {} even toggle", round);
        }
        assert_eq!(recorder.sessions_recorded(), 3);
    }

    #[tokio::test]
    async fn test_empty_session_creates_directories_and_nothing_else() {
        let root = tempfile::tempdir().unwrap();
        let output_root = root.path().join("recordings");
        let mut recorder = empty_recorder("test", &output_root);

        recorder.toggle().await.unwrap();
        let dir = recorder.session().unwrap().info().dir.clone();
        let summary = recorder.toggle().await.unwrap().expect("stop summary");

        assert!(output_root.is_dir());
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        assert_eq!(summary.sources_started, 0);
        assert_eq!(summary.info.label, "test");
    }

    #[tokio::test]
    async fn test_summary_only_on_stop() {
        let root = tempfile::tempdir().unwrap();
        let mut recorder = empty_recorder("s", root.path());
        assert!(recorder.toggle().await.unwrap().is_none());
        assert!(recorder.toggle().await.unwrap().is_some());
        assert!(recorder.stop_if_active().await.is_none());
    }

    #[tokio::test]
    async fn test_indicator_follows_state() {
        let recording = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(AtomicUsize::new(0));
        let root = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(
            "ind",
            root.path(),
            Vec::new(),
            Duration::from_secs(5),
            Box::new(CountingIndicator {
                recording: Arc::clone(&recording),
                idle: Arc::clone(&idle),
            }),
        );
        assert_eq!(idle.load(Ordering::SeqCst), 1);

        recorder.toggle().await.unwrap();
        assert_eq!(recording.load(Ordering::SeqCst), 1);
        recorder.toggle().await.unwrap();
        assert_eq!(idle.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_files_share_timestamp() {
        let root = tempfile::tempdir().unwrap();
        let sources = vec![
            SourceConfig::Camera(shell_camera("camera1")),
            SourceConfig::Camera(shell_camera("camera2")),
            SourceConfig::Depth(small_depth()),
        ];
        let mut recorder = Recorder::new(
            "ride",
            root.path(),
            sources,
            Duration::from_secs(5),
            Box::new(NullIndicator),
        );

        recorder.toggle().await.unwrap();
        let info = recorder.session().unwrap().info().clone();
        assert_eq!(recorder.session().unwrap().source_count(), 3);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let summary = recorder.toggle().await.unwrap().unwrap();

        assert_eq!(summary.sources_started, 3);
        assert_eq!(summary.sources_clean, 3);
        for file in [
            format!("camera1_{}.h264", info.timestamp),
            format!("camera2_{}.h264", info.timestamp),
            format!("depthcam_{}.avi", info.timestamp),
            format!("accelerometer_{}.json", info.timestamp),
            format!("gyroscope_{}.json", info.timestamp),
            format!("imu_vector_{}.json", info.timestamp),
        ] {
            assert!(info.dir.join(&file).exists(), "missing {}", file);
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_source_skipped_session_continues() {
        let root = tempfile::tempdir().unwrap();
        let sources = vec![
            SourceConfig::Camera(CameraCommand {
                name: "camera1".to_string(),
                program: "rigrec-no-such-recorder".to_string(),
                args: vec![],
                extension: "h264".to_string(),
            }),
            SourceConfig::Depth(small_depth()),
        ];
        let mut recorder = Recorder::new(
            "partial",
            root.path(),
            sources,
            Duration::from_secs(5),
            Box::new(NullIndicator),
        );

        recorder.toggle().await.unwrap();
        assert!(recorder.is_recording());
        let info = recorder.session().unwrap().info().clone();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let summary = recorder.toggle().await.unwrap().unwrap();

        assert_eq!(summary.sources_started, 1);
        assert_eq!(summary.sources_clean, 1);
        assert!(info
            .dir
            .join(format!("depthcam_{}.avi", info.timestamp))
            .exists());
        assert!(!info
            .dir
            .join(format!("camera1_{}.h264", info.timestamp))
            .exists());
    }

    #[tokio::test]
    async fn test_from_config_default_is_sourceless() {
        let root = tempfile::tempdir().unwrap();
        let mut config = RigConfig::default();
        config.output_root = root.path().to_path_buf();
        let mut recorder = Recorder::from_config(&config, Box::new(NullIndicator));
        recorder.toggle().await.unwrap();
        assert!(recorder.is_recording());
        recorder.stop_if_active().await.unwrap();
        assert!(!recorder.is_recording());
    }
}
