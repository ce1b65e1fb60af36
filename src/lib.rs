//! rigrec — session coordinator for a multi-sensor recording rig.
//!
//! The rig is two board cameras driven by an external recorder command, a
//! depth/IMU camera module, a GPS receiver, a status indicator (LED or RGB
//! character LCD) and a physical button. One trigger toggles the whole rig
//! between idle and recording; every file of a session shares one timestamp.
//!
//! Control flow: a trigger source delivers toggle events into a bounded
//! channel, the [`Recorder`] starts or stops a [`Session`], and each capture
//! source writes its own files under the session directory. Sources are
//! independent: a camera that fails to start or a worker that misses the
//! stop deadline never takes the rest of the session down.
//!
//! Hardware access is feature-gated so the crate builds and tests anywhere:
//! `gpio` (button, polled pin, LED), `lcd` (I2C character display) and
//! `serial` (GPS port). The depth module sits behind the
//! [`device::DepthDevice`] trait with a built-in simulator backend.

pub mod avi;
pub mod config;
pub mod depth;
pub mod device;
pub mod gps;
pub mod imu;
pub mod indicator;
pub mod jsonl;
pub mod overlay;
pub mod pose;
pub mod process;
pub mod session;
pub mod source;
pub mod time;
pub mod trigger;

pub use config::RigConfig;
pub use indicator::{build_indicator, StatusIndicator};
pub use session::{Recorder, Session, SessionInfo, SessionSummary};
pub use source::{sources_from_config, ActiveSource, SourceConfig};
pub use trigger::start_trigger;
