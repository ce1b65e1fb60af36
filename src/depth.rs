//! Depth/IMU capture source.
//!
//! A dedicated blocking worker polls the device for frames and inertial
//! packets until the session token is cancelled. Accepted frames get the
//! wall-clock stamp (plus pose markers when a detector is attached), are
//! JPEG-encoded and appended to the session AVI; inertial samples go to one
//! JSON-lines file per enabled category.
//!
//! The device itself is constructed on the worker thread, so a failed open
//! disables this source for the session while everything else records on.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::avi::AviWriter;
use crate::device::{DeviceFactory, SimDepthDevice};
use crate::imu::{AxisSample, RotationSample, SampleCategory};
use crate::jsonl::JsonlWriter;
use crate::overlay;
use crate::pose::{PoseDetector, PoseRecord};
use crate::time::{clock_text, unix_time};

/// Poll pacing while no data is waiting.
const IDLE_POLL: Duration = Duration::from_millis(1);
/// Back-off after a device poll error.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);
/// Frame rate the simulator device delivers at, independent of the encode
/// target (real modules preview around this rate).
const SIM_DEVICE_FPS: u32 = 30;

/// Depth module settings as they appear in the rig config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Device backend; `"sim"` is built in, real modules attach via
    /// [`DepthSource::new`].
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Target encode rate; faster frames are dropped.
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_true")]
    pub log_accel: bool,
    #[serde(default = "default_true")]
    pub log_gyro: bool,
    #[serde(default = "default_true")]
    pub log_rotation: bool,
}

fn default_name() -> String {
    "depthcam".to_string()
}
fn default_device() -> String {
    "sim".to_string()
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_fps() -> u32 {
    15
}
fn default_quality() -> u8 {
    90
}
fn default_true() -> bool {
    true
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            device: default_device(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            jpeg_quality: default_quality(),
            log_accel: true,
            log_gyro: true,
            log_rotation: true,
        }
    }
}

/// Admits frames at a fixed target rate by elapsed-time comparison.
/// Early frames are dropped, never queued.
pub struct FrameThrottle {
    interval: Duration,
    last: Option<Duration>,
}

impl FrameThrottle {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            last: None,
        }
    }

    /// Decide whether a frame arriving at `elapsed` (monotonic time since
    /// capture start) is admitted.
    pub fn accept(&mut self, elapsed: Duration) -> bool {
        match self.last {
            Some(last) if elapsed.saturating_sub(last) < self.interval => false,
            _ => {
                self.last = Some(elapsed);
                true
            }
        }
    }
}

/// A configured depth capture source, ready to start.
pub struct DepthSource {
    config: DepthConfig,
    factory: DeviceFactory,
    pose: Option<Box<dyn PoseDetector + Send>>,
}

impl DepthSource {
    /// Attach a concrete device (and optionally a pose detector) to the
    /// given settings. The factory runs on the worker thread.
    pub fn new(
        config: DepthConfig,
        factory: DeviceFactory,
        pose: Option<Box<dyn PoseDetector + Send>>,
    ) -> Self {
        Self {
            config,
            factory,
            pose,
        }
    }

    /// Build a source from config alone. Only the simulator backend can be
    /// named in the config file; real devices carry non-serializable handles.
    pub fn from_config(config: &DepthConfig) -> Result<Self> {
        match config.device.as_str() {
            "sim" => {
                let (w, h) = (config.width, config.height);
                Ok(Self::new(
                    config.clone(),
                    Box::new(move || Ok(Box::new(SimDepthDevice::new(w, h, SIM_DEVICE_FPS)))),
                    None,
                ))
            }
            other => bail!("unknown depth device backend {:?}", other),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Open the device and wait briefly for a first frame. Consumes the
    /// source; used by bring-up checks, never during a session.
    pub fn probe(self, wait: Duration) -> Result<()> {
        let mut device = (self.factory)()?;
        let started = Instant::now();
        loop {
            if device.poll_frame()?.is_some() {
                return Ok(());
            }
            if started.elapsed() >= wait {
                bail!("no frame within {:.1}s", wait.as_secs_f64());
            }
            std::thread::sleep(IDLE_POLL);
        }
    }

    /// Open the session files and spawn the capture worker.
    ///
    /// Files are created here so a failure leaves nothing open; the device
    /// opens later, on the worker. Output names:
    /// `<name>_<timestamp>.avi` plus `<category>_<timestamp>.json`.
    pub fn start(
        self,
        dir: &Path,
        timestamp: &str,
        cancel: &CancellationToken,
    ) -> Result<DepthHandle> {
        let config = self.config;
        let video_path = dir.join(format!("{}_{}.avi", config.name, timestamp));
        let video = AviWriter::create(&video_path, config.width, config.height, config.fps)?;

        let category_writer = |on: bool, category: SampleCategory| -> Result<Option<JsonlWriter>> {
            if !on {
                return Ok(None);
            }
            let path = dir.join(format!("{}_{}.json", category.file_stem(), timestamp));
            Ok(Some(JsonlWriter::create(&path)?))
        };
        let writers = SampleWriters {
            accel: category_writer(config.log_accel, SampleCategory::Accelerometer)?,
            gyro: category_writer(config.log_gyro, SampleCategory::Gyroscope)?,
            rotation: category_writer(config.log_rotation, SampleCategory::Rotation)?,
            poses: match self.pose {
                Some(_) => Some(JsonlWriter::create(
                    &dir.join(format!("landmarks_{}.json", timestamp)),
                )?),
                None => None,
            },
        };

        tracing::info!("[{}] depth capture -> {}", config.name, video_path.display());
        let name = config.name.clone();
        let cancel = cancel.clone();
        let factory = self.factory;
        let pose = self.pose;
        let task = tokio::task::spawn_blocking(move || {
            run_capture(config, factory, pose, video, writers, cancel)
        });
        Ok(DepthHandle { name, task })
    }
}

/// Handle to a running depth worker, joined on session stop.
pub struct DepthHandle {
    name: String,
    task: JoinHandle<DepthStats>,
}

impl DepthHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join the worker with a bounded wait. A worker stuck in a device call
    /// past the deadline is abandoned and logged.
    pub async fn join(self, timeout: Duration) -> Option<DepthStats> {
        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(stats)) => {
                tracing::info!(
                    "[{}] {} frames written, {} dropped, {} samples",
                    self.name,
                    stats.frames_written,
                    stats.frames_dropped,
                    stats.samples
                );
                Some(stats)
            }
            Ok(Err(e)) => {
                tracing::warn!("[{}] depth worker panicked: {}", self.name, e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "[{}] depth worker missed the stop deadline, abandoning",
                    self.name
                );
                None
            }
        }
    }
}

/// Counters reported when a depth capture stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthStats {
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub samples: u64,
    pub poses: u64,
}

struct SampleWriters {
    accel: Option<JsonlWriter>,
    gyro: Option<JsonlWriter>,
    rotation: Option<JsonlWriter>,
    poses: Option<JsonlWriter>,
}

fn run_capture(
    config: DepthConfig,
    factory: DeviceFactory,
    mut pose: Option<Box<dyn PoseDetector + Send>>,
    video: AviWriter<std::io::BufWriter<std::fs::File>>,
    mut writers: SampleWriters,
    cancel: CancellationToken,
) -> DepthStats {
    let mut stats = DepthStats::default();
    let mut video = video;

    let mut device = match factory() {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("[{}] depth device open failed: {}", config.name, e);
            if let Err(e) = video.finish() {
                tracing::warn!("[{}] video finalize failed: {}", config.name, e);
            }
            return stats;
        }
    };

    let mut throttle = FrameThrottle::new(config.fps);
    let started = Instant::now();
    let mut size_warned = false;

    while !cancel.is_cancelled() {
        let mut idle = true;

        match device.poll_frame() {
            Ok(Some(mut frame)) => {
                idle = false;
                if !throttle.accept(started.elapsed()) {
                    stats.frames_dropped += 1;
                } else {
                    if (frame.width, frame.height) != (config.width, config.height)
                        && !size_warned
                    {
                        tracing::warn!(
                            "[{}] device frames are {}x{}, header says {}x{}",
                            config.name,
                            frame.width,
                            frame.height,
                            config.width,
                            config.height
                        );
                        size_warned = true;
                    }
                    if let Some(detector) = pose.as_mut() {
                        let landmarks = detector.detect(&frame);
                        if !landmarks.is_empty() {
                            let points: Vec<(f64, f64)> =
                                landmarks.iter().map(|l| (l.x, l.y)).collect();
                            overlay::draw_markers(
                                &mut frame.data,
                                frame.width,
                                frame.height,
                                &points,
                            );
                            if let Some(w) = writers.poses.as_mut() {
                                let record = PoseRecord {
                                    timestamp: unix_time(),
                                    landmarks,
                                };
                                if let Err(e) = w.append(&record) {
                                    tracing::warn!("[{}] pose log write failed: {}", config.name, e);
                                } else {
                                    stats.poses += 1;
                                }
                            }
                        }
                    }
                    overlay::stamp_clock(&mut frame.data, frame.width, frame.height, &clock_text());
                    match frame.to_jpeg(config.jpeg_quality) {
                        Ok(jpeg) => {
                            if let Err(e) = video.write_frame(&jpeg) {
                                tracing::warn!("[{}] video write failed: {}", config.name, e);
                            } else {
                                stats.frames_written += 1;
                            }
                        }
                        Err(e) => tracing::warn!("[{}] JPEG encode failed: {}", config.name, e),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("[{}] frame poll error (retrying): {}", config.name, e);
                std::thread::sleep(ERROR_BACKOFF);
            }
        }

        match device.poll_imu() {
            Ok(Some(packet)) => {
                idle = false;
                let timestamp = unix_time();
                if let (Some([x, y, z]), Some(w)) = (packet.accel, writers.accel.as_mut()) {
                    append_sample(w, &AxisSample { x, y, z, timestamp }, &config.name, &mut stats);
                }
                if let (Some([x, y, z]), Some(w)) = (packet.gyro, writers.gyro.as_mut()) {
                    append_sample(w, &AxisSample { x, y, z, timestamp }, &config.name, &mut stats);
                }
                if let (Some(r), Some(w)) = (packet.rotation, writers.rotation.as_mut()) {
                    let sample = RotationSample {
                        i: r.i,
                        j: r.j,
                        k: r.k,
                        real: r.real,
                        accuracy: r.accuracy,
                        timestamp,
                    };
                    append_sample(w, &sample, &config.name, &mut stats);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("[{}] IMU poll error (retrying): {}", config.name, e);
                std::thread::sleep(ERROR_BACKOFF);
            }
        }

        if idle {
            std::thread::sleep(IDLE_POLL);
        }
    }

    if let Err(e) = video.finish() {
        tracing::warn!("[{}] video finalize failed: {}", config.name, e);
    }
    stats
}

fn append_sample<T: serde::Serialize>(
    writer: &mut JsonlWriter,
    sample: &T,
    name: &str,
    stats: &mut DepthStats,
) {
    match writer.append(sample) {
        Ok(()) => stats.samples += 1,
        Err(e) => tracing::warn!("[{}] sample write failed: {}", name, e),
    }
}
