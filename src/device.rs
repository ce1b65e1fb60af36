//! Depth/IMU device abstraction.
//!
//! The vendor SDK sits behind [`DepthDevice`]: two non-blocking polls, one
//! for video frames and one for inertial packets, mirroring the try-get
//! queues such modules expose. Devices are constructed *inside* the capture
//! worker via a factory closure, so handles that are not `Send` never cross
//! a thread boundary.
//!
//! [`SimDepthDevice`] is a stand-in generator for hosts without the hardware;
//! it paces itself with the wall clock so capture behaves realistically.

use std::time::Instant;

use anyhow::Result;

/// One RGB24 video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width * height * 3) as usize],
        }
    }

    /// Encode to JPEG at the given quality (1-100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut jpeg = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
        encoder.encode(
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(jpeg)
    }
}

/// Rotation-vector reading as delivered by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationVector {
    pub i: f64,
    pub j: f64,
    pub k: f64,
    pub real: f64,
    pub accuracy: f64,
}

/// One inertial packet. A packet may carry any subset of the three sensor
/// categories; absent ones are `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImuPacket {
    pub accel: Option<[f64; 3]>,
    pub gyro: Option<[f64; 3]>,
    pub rotation: Option<RotationVector>,
}

/// Narrow interface over a vendor depth/IMU module.
pub trait DepthDevice {
    /// Non-blocking frame poll; `Ok(None)` when nothing is waiting.
    fn poll_frame(&mut self) -> Result<Option<Frame>>;
    /// Non-blocking inertial poll; `Ok(None)` when nothing is waiting.
    fn poll_imu(&mut self) -> Result<Option<ImuPacket>>;
}

/// Constructor invoked on the capture worker thread.
pub type DeviceFactory = Box<dyn FnOnce() -> Result<Box<dyn DepthDevice>> + Send>;

/// Synthetic frame and IMU generator.
///
/// Frames are a scrolling gradient at the configured rate; inertial packets
/// arrive at roughly 100 Hz carrying all three categories.
pub struct SimDepthDevice {
    width: u32,
    height: u32,
    frame_interval: f64,
    imu_interval: f64,
    started: Instant,
    last_frame: Option<f64>,
    last_imu: Option<f64>,
    phase: u64,
}

impl SimDepthDevice {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: 1.0 / fps.max(1) as f64,
            imu_interval: 0.01,
            started: Instant::now(),
            last_frame: None,
            last_imu: None,
            phase: 0,
        }
    }

    fn gradient_frame(&self) -> Frame {
        let mut frame = Frame::black(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = ((y * self.width + x) * 3) as usize;
                frame.data[idx] = ((x as u64 + self.phase) & 0xFF) as u8;
                frame.data[idx + 1] = ((y as u64 + self.phase / 2) & 0xFF) as u8;
                frame.data[idx + 2] = (self.phase & 0xFF) as u8;
            }
        }
        frame
    }
}

impl DepthDevice for SimDepthDevice {
    fn poll_frame(&mut self) -> Result<Option<Frame>> {
        let now = self.started.elapsed().as_secs_f64();
        let due = match self.last_frame {
            None => true,
            Some(last) => now - last >= self.frame_interval,
        };
        if !due {
            return Ok(None);
        }
        self.last_frame = Some(now);
        self.phase += 1;
        Ok(Some(self.gradient_frame()))
    }

    fn poll_imu(&mut self) -> Result<Option<ImuPacket>> {
        let now = self.started.elapsed().as_secs_f64();
        let due = match self.last_imu {
            None => true,
            Some(last) => now - last >= self.imu_interval,
        };
        if !due {
            return Ok(None);
        }
        self.last_imu = Some(now);
        let t = now;
        Ok(Some(ImuPacket {
            accel: Some([0.2 * (t * 3.0).sin(), 0.2 * (t * 2.0).cos(), 9.81]),
            gyro: Some([0.01 * (t * 5.0).sin(), -0.01 * (t * 4.0).cos(), 0.0]),
            rotation: Some(RotationVector {
                i: 0.0,
                j: 0.0,
                k: (t * 0.5).sin(),
                real: (t * 0.5).cos(),
                accuracy: 0.05,
            }),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_first_frame_immediate() {
        let mut dev = SimDepthDevice::new(32, 24, 30);
        let frame = dev.poll_frame().unwrap().expect("first poll yields a frame");
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24);
        assert_eq!(frame.data.len(), 32 * 24 * 3);
    }

    #[test]
    fn test_sim_paces_frames() {
        let mut dev = SimDepthDevice::new(16, 16, 5);
        assert!(dev.poll_frame().unwrap().is_some());
        // Immediately after, the next frame is not due yet at 5 fps.
        assert!(dev.poll_frame().unwrap().is_none());
    }

    #[test]
    fn test_sim_imu_carries_all_categories() {
        let mut dev = SimDepthDevice::new(16, 16, 30);
        let packet = dev.poll_imu().unwrap().expect("first poll yields a packet");
        assert!(packet.accel.is_some());
        assert!(packet.gyro.is_some());
        assert!(packet.rotation.is_some());
    }

    #[test]
    fn test_frame_jpeg_encode() {
        let mut dev = SimDepthDevice::new(48, 32, 30);
        let frame = dev.poll_frame().unwrap().unwrap();
        let jpeg = frame.to_jpeg(80).unwrap();
        assert!(jpeg.len() > 4);
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }
}
