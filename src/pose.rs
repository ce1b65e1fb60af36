//! Optional pose-landmark annotation for the depth video.
//!
//! Inference itself is a vendor concern; the capture worker only needs a
//! per-frame detection call whose results it can draw and log.

use serde::{Deserialize, Serialize};

use crate::device::Frame;

/// One body landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
}

/// Every landmark detected on one frame, as logged to
/// `landmarks_<session-timestamp>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub timestamp: f64,
    pub landmarks: Vec<Landmark>,
}

/// Narrow interface over a vendor pose-inference model.
pub trait PoseDetector {
    /// Detect landmarks on one frame; empty when no body is visible.
    fn detect(&mut self, frame: &Frame) -> Vec<Landmark>;
}
