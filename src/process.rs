//! Board camera capture via an external recorder command.
//!
//! Each board camera is one configured command line (for the rig,
//! `rpicam-vid`) spawned with the session output path substituted into its
//! arguments. The child's lifetime is the capture lifetime: stop sends
//! SIGTERM, waits a bounded grace period, then kills.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);
/// Settle time after spawn to catch commands that die right away.
const SPAWN_CHECK: Duration = Duration::from_millis(100);

/// One external recorder invocation, as configured per board camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCommand {
    /// Source name; also the video file stem.
    pub name: String,
    /// Recorder executable.
    pub program: String,
    /// Arguments; every `{output}` expands to the session video path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Container extension the recorder produces.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "h264".to_string()
}

impl CameraCommand {
    pub fn output_path(&self, dir: &Path, timestamp: &str) -> PathBuf {
        dir.join(format!("{}_{}.{}", self.name, timestamp, self.extension))
    }

    fn expanded_args(&self, output: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{output}", output))
            .collect()
    }

    /// Launch the recorder for one session. A child that cannot be spawned
    /// or exits within the settle window is a start failure.
    pub async fn start(&self, dir: &Path, timestamp: &str) -> Result<CameraProcess> {
        let output = self.output_path(dir, timestamp);
        let args = self.expanded_args(&output.to_string_lossy());
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {} for {}", self.program, self.name))?;

        tokio::time::sleep(SPAWN_CHECK).await;
        if let Some(status) = child.try_wait()? {
            bail!("{} exited immediately: {}", self.program, status);
        }
        tracing::info!(
            "[{}] recorder started (pid {}): {} {}",
            self.name,
            child.id().unwrap_or(0),
            self.program,
            args.join(" ")
        );
        Ok(CameraProcess {
            name: self.name.clone(),
            child,
        })
    }
}

/// A running recorder child, owned by the active session.
pub struct CameraProcess {
    name: String,
    child: Child,
}

impl CameraProcess {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Graceful terminate, then block until exit with a bounded wait.
    pub async fn stop(mut self) -> Result<()> {
        let pid = match self.child.id() {
            Some(pid) => pid,
            None => {
                let status = self.child.wait().await?;
                tracing::info!("[{}] recorder already exited: {}", self.name, status);
                return Ok(());
            }
        };

        #[cfg(unix)]
        {
            let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if ret != 0 {
                tracing::warn!(
                    "[{}] SIGTERM failed: {}",
                    self.name,
                    std::io::Error::last_os_error()
                );
            }
        }
        #[cfg(not(unix))]
        self.child.start_kill()?;

        match tokio::time::timeout(TERM_GRACE, self.child.wait()).await {
            Ok(status) => {
                tracing::info!("[{}] recorder exited: {}", self.name, status?);
            }
            Err(_) => {
                tracing::warn!("[{}] recorder ignored SIGTERM, killing", self.name);
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}
