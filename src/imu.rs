//! Inertial sample records as they appear in the session JSON logs.

use serde::{Deserialize, Serialize};

/// Three-axis reading, used for both accelerometer and gyroscope samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

/// Rotation-vector (orientation quaternion) reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationSample {
    pub i: f64,
    pub j: f64,
    pub k: f64,
    pub real: f64,
    pub accuracy: f64,
    pub timestamp: f64,
}

/// Sample categories the depth module can log, one file per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCategory {
    Accelerometer,
    Gyroscope,
    Rotation,
}

impl SampleCategory {
    /// File stem used in `<stem>_<session-timestamp>.json`.
    pub fn file_stem(&self) -> &'static str {
        match self {
            SampleCategory::Accelerometer => "accelerometer",
            SampleCategory::Gyroscope => "gyroscope",
            SampleCategory::Rotation => "imu_vector",
        }
    }
}
