//! GPS capture: reads a serial byte stream line by line and classifies
//! sentence-delimited records into the session log.
//!
//! Classification is deliberately shallow. A line starting with `$` is split
//! on commas and the positional fields of the three sentence types the rig
//! cares about (GGA, RMC, VTG) are kept verbatim as strings; anything else
//! stays intact under a `RAW` tag. Checksums and field validation are the
//! consumer's problem.

use serde::{Deserialize, Serialize};

/// Serial settings for the GPS receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsConfig {
    /// Port name, e.g. `/dev/ttyUSB0`.
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_baud() -> u32 {
    9600
}

impl GpsConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud: default_baud(),
        }
    }
}

/// One classified GPS record as written to `gps_<session-timestamp>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GpsRecord {
    /// Position fix (GGA).
    #[serde(rename = "GGA")]
    Gga {
        timestamp: f64,
        utc_time: String,
        latitude: String,
        latitude_dir: String,
        longitude: String,
        longitude_dir: String,
        fix_quality: String,
        satellites: String,
        hdop: String,
        altitude: String,
    },
    /// Recommended minimum (RMC).
    #[serde(rename = "RMC")]
    Rmc {
        timestamp: f64,
        utc_time: String,
        status: String,
        latitude: String,
        latitude_dir: String,
        longitude: String,
        longitude_dir: String,
        speed_knots: String,
        course: String,
        date: String,
    },
    /// Course and speed over ground (VTG).
    #[serde(rename = "VTG")]
    Vtg {
        timestamp: f64,
        course_true: String,
        course_magnetic: String,
        speed_knots: String,
        speed_kmh: String,
    },
    /// Any other `$`-sentence, preserved verbatim.
    #[serde(rename = "RAW")]
    Raw { timestamp: f64, sentence: String },
}

/// Classify one serial line. Returns `None` for lines that are not
/// `$`-sentences (noise, partial reads, empty lines).
pub fn classify_sentence(line: &str, timestamp: f64) -> Option<GpsRecord> {
    let line = line.trim();
    if !line.starts_with('$') {
        return None;
    }
    let parts: Vec<&str> = line.split(',').collect();
    let header = parts[0];
    // The talker prefix (GP/GN/GL/...) varies by constellation; the sentence
    // type is the last three bytes of the header. Lossily decoded garbage can
    // put a multi-byte replacement char across that cut, so slice fallibly;
    // such lines stay RAW.
    let kind = if header.len() >= 6 {
        header.get(header.len() - 3..).unwrap_or("")
    } else {
        ""
    };
    let field = |i: usize| parts.get(i).copied().unwrap_or("").to_string();

    let record = match kind {
        "GGA" if parts.len() >= 10 => GpsRecord::Gga {
            timestamp,
            utc_time: field(1),
            latitude: field(2),
            latitude_dir: field(3),
            longitude: field(4),
            longitude_dir: field(5),
            fix_quality: field(6),
            satellites: field(7),
            hdop: field(8),
            altitude: field(9),
        },
        "RMC" if parts.len() >= 10 => GpsRecord::Rmc {
            timestamp,
            utc_time: field(1),
            status: field(2),
            latitude: field(3),
            latitude_dir: field(4),
            longitude: field(5),
            longitude_dir: field(6),
            speed_knots: field(7),
            course: field(8),
            date: field(9),
        },
        "VTG" if parts.len() >= 8 => GpsRecord::Vtg {
            timestamp,
            course_true: field(1),
            course_magnetic: field(3),
            speed_knots: field(5),
            speed_kmh: field(7),
        },
        _ => GpsRecord::Raw {
            timestamp,
            sentence: line.to_string(),
        },
    };
    Some(record)
}

/// Counters reported when a GPS capture stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpsStats {
    pub sentences: u64,
    pub read_errors: u64,
}

#[cfg(feature = "serial")]
pub use capture::{start_gps_capture, GpsHandle};

#[cfg(feature = "serial")]
mod capture {
    use super::*;
    use crate::jsonl::JsonlWriter;
    use crate::time::unix_time;
    use anyhow::{Context, Result};
    use std::io::ErrorKind;
    use std::path::Path;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::task::JoinHandle;
    use tokio_serial::SerialPortBuilderExt;
    use tokio_util::sync::CancellationToken;

    const READ_BACKOFF: Duration = Duration::from_millis(500);

    /// Open the port and the session log, then spawn the read loop.
    ///
    /// The log file is owned by the loop task and drops closed when the loop
    /// exits. An open failure here leaves nothing behind: the writer created
    /// first is dropped on the error path.
    pub fn start_gps_capture(
        config: &GpsConfig,
        log_path: &Path,
        cancel: CancellationToken,
    ) -> Result<GpsHandle> {
        let writer = JsonlWriter::create(log_path)?;
        let stream = tokio_serial::new(&config.port, config.baud)
            .open_native_async()
            .with_context(|| format!("opening GPS port {}", config.port))?;
        tracing::info!("GPS capture on {} at {} baud", config.port, config.baud);
        Ok(GpsHandle {
            task: tokio::spawn(read_loop(stream, writer, cancel)),
        })
    }

    /// Handle to a running GPS reader, joined on session stop.
    pub struct GpsHandle {
        task: JoinHandle<GpsStats>,
    }

    impl GpsHandle {
        /// Join the reader with a bounded wait. A reader stuck in a port call
        /// past the deadline is abandoned and logged.
        pub async fn join(self, timeout: Duration) -> Option<GpsStats> {
            match tokio::time::timeout(timeout, self.task).await {
                Ok(Ok(stats)) => Some(stats),
                Ok(Err(e)) => {
                    tracing::warn!("GPS reader panicked: {}", e);
                    None
                }
                Err(_) => {
                    tracing::warn!("GPS reader missed the stop deadline, abandoning");
                    None
                }
            }
        }
    }

    async fn read_loop(
        stream: tokio_serial::SerialStream,
        mut writer: JsonlWriter,
        cancel: CancellationToken,
    ) -> GpsStats {
        let mut stats = GpsStats::default();
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::new();
        loop {
            buf.clear();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = reader.read_until(b'\n', &mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::warn!("GPS port EOF, retrying");
                            stats.read_errors += 1;
                            tokio::time::sleep(READ_BACKOFF).await;
                        }
                        Ok(_) => {
                            // Receivers emit the odd garbled byte; decode lossily
                            // rather than dropping the line.
                            let line = String::from_utf8_lossy(&buf);
                            if let Some(record) = classify_sentence(&line, unix_time()) {
                                stats.sentences += 1;
                                if let Err(e) = writer.append(&record) {
                                    tracing::warn!("GPS log write failed: {}", e);
                                }
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::TimedOut
                            || e.kind() == ErrorKind::WouldBlock => {}
                        Err(e) => {
                            tracing::warn!("GPS read error (retrying): {}", e);
                            stats.read_errors += 1;
                            tokio::time::sleep(READ_BACKOFF).await;
                        }
                    }
                }
            }
        }
        tracing::info!(
            "GPS capture stopped: {} sentences, {} read errors",
            stats.sentences,
            stats.read_errors
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_gga() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        match classify_sentence(line, 100.0) {
            Some(GpsRecord::Gga {
                timestamp,
                utc_time,
                latitude,
                latitude_dir,
                longitude,
                longitude_dir,
                fix_quality,
                satellites,
                hdop,
                altitude,
            }) => {
                assert_eq!(timestamp, 100.0);
                assert_eq!(utc_time, "123519");
                assert_eq!(latitude, "4807.038");
                assert_eq!(latitude_dir, "N");
                assert_eq!(longitude, "01131.000");
                assert_eq!(longitude_dir, "E");
                assert_eq!(fix_quality, "1");
                assert_eq!(satellites, "08");
                assert_eq!(hdop, "0.9");
                assert_eq!(altitude, "545.4");
            }
            other => panic!("expected GGA, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_rmc() {
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        match classify_sentence(line, 5.0) {
            Some(GpsRecord::Rmc {
                status,
                latitude,
                speed_knots,
                course,
                date,
                ..
            }) => {
                assert_eq!(status, "A");
                assert_eq!(latitude, "4807.038");
                assert_eq!(speed_knots, "022.4");
                assert_eq!(course, "084.4");
                assert_eq!(date, "230394");
            }
            other => panic!("expected RMC, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_vtg() {
        let line = "$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K*48";
        match classify_sentence(line, 1.0) {
            Some(GpsRecord::Vtg {
                course_true,
                course_magnetic,
                speed_knots,
                speed_kmh,
                ..
            }) => {
                assert_eq!(course_true, "054.7");
                assert_eq!(course_magnetic, "034.4");
                assert_eq!(speed_knots, "005.5");
                assert_eq!(speed_kmh, "010.2");
            }
            other => panic!("expected VTG, got {:?}", other),
        }
    }

    #[test]
    fn test_other_talker_prefix() {
        let line = "$GNGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        assert!(matches!(
            classify_sentence(line, 0.0),
            Some(GpsRecord::Gga { .. })
        ));
    }

    #[test]
    fn test_unknown_sentence_kept_raw() {
        let line = "$GPGSV,3,1,11,03,03,111,00,04,15,270,00*74";
        match classify_sentence(line, 2.0) {
            Some(GpsRecord::Raw { sentence, .. }) => assert_eq!(sentence, line),
            other => panic!("expected RAW, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_gga_kept_raw() {
        // Too few fields for a GGA extraction; preserved rather than guessed at.
        let line = "$GPGGA,123519,4807.038";
        assert!(matches!(
            classify_sentence(line, 0.0),
            Some(GpsRecord::Raw { .. })
        ));
    }

    #[test]
    fn test_garbled_line_kept_raw() {
        // A stray invalid byte in the header becomes a three-byte replacement
        // char under lossy decoding and can straddle the kind suffix; the
        // line must classify as RAW, not kill the reader.
        let line = String::from_utf8_lossy(b"$A\xFFB,1");
        match classify_sentence(&line, 3.0) {
            Some(GpsRecord::Raw { sentence, .. }) => {
                assert_eq!(sentence, "$A\u{FFFD}B,1");
            }
            other => panic!("expected RAW, got {:?}", other),
        }
    }

    #[test]
    fn test_non_sentence_skipped() {
        assert!(classify_sentence("", 0.0).is_none());
        assert!(classify_sentence("   \r\n", 0.0).is_none());
        assert!(classify_sentence("garbage without marker", 0.0).is_none());
    }

    #[test]
    fn test_record_round_trip_with_tag() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        let record = classify_sentence(line, 42.0).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "GGA");
        assert_eq!(value["latitude"], "4807.038");
        let back: GpsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_raw_round_trip() {
        let record = GpsRecord::Raw {
            timestamp: 7.0,
            sentence: "$PMTK001,314,3*36".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "RAW");
        let back: GpsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
