//! Line-delimited JSON sample logs.
//!
//! One JSON object per line, no enclosing array, flushed after every record
//! so a session that dies mid-write loses at most the line in flight.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

pub struct JsonlWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl JsonlWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Append one record as a single JSON line and flush it to disk.
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .with_context(|| format!("serializing record for {}", self.path.display()))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    /// Number of records appended so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Reading {
        x: f64,
        timestamp: f64,
    }

    #[test]
    fn test_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.json");
        let mut w = JsonlWriter::create(&path).unwrap();
        w.append(&Reading {
            x: 1.5,
            timestamp: 10.0,
        })
        .unwrap();
        w.append(&Reading {
            x: -2.0,
            timestamp: 11.0,
        })
        .unwrap();
        assert_eq!(w.lines(), 2);
        drop(w);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let parsed: Reading = serde_json::from_str(line).unwrap();
            assert!(parsed.timestamp >= 10.0);
        }
        // Streaming format: no enclosing array, no trailing comma.
        assert!(!content.starts_with('['));
        assert!(!content.contains("},{"));
    }

    #[test]
    fn test_flushed_while_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.json");
        let mut w = JsonlWriter::create(&path).unwrap();
        w.append(&Reading {
            x: 0.0,
            timestamp: 1.0,
        })
        .unwrap();
        // Readable before the writer is dropped.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
