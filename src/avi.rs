//! Minimal RIFF/AVI writer for MJPG video.
//!
//! Each accepted frame is one JPEG image appended as a `00dc` chunk. The
//! header is written up front with placeholder counts and patched when the
//! file is finished, so frames stream straight to disk while recording.
//!
//! Layout:
//! ```text
//! RIFF <size> AVI
//!   LIST hdrl
//!     avih            main header (frame count patched on finish)
//!     LIST strl
//!       strh          stream header (length patched on finish)
//!       strf          BITMAPINFOHEADER, biCompression = MJPG
//!   LIST movi
//!     00dc <jpeg> ... per-frame chunks, padded to even offsets
//!   idx1              one entry per frame, offsets relative to movi
//! ```

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

const AVIF_HASINDEX: u32 = 0x0000_0010;
const AVIIF_KEYFRAME: u32 = 0x0000_0010;

struct IndexEntry {
    /// Offset of the chunk header, relative to the `movi` fourcc.
    offset: u32,
    size: u32,
}

pub struct AviWriter<W: Write + Seek> {
    writer: W,
    fps: u32,
    index: Vec<IndexEntry>,
    riff_size_pos: u64,
    total_frames_pos: u64,
    length_pos: u64,
    movi_size_pos: u64,
    /// Position of the `movi` fourcc; idx1 offsets are measured from here.
    movi_fourcc_pos: u64,
}

fn put_u32<W: Write>(w: &mut W, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn put_u16<W: Write>(w: &mut W, v: u16) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Every RIFF size and offset field is 32-bit; past 4 GiB the header can no
/// longer describe the file, so oversized values are an error, never a wrap.
fn riff_size(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("past the 4 GiB RIFF size limit"))
}

impl AviWriter<BufWriter<File>> {
    /// Create the file and write the fixed header.
    pub fn create(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Self::new(BufWriter::new(file), width, height, fps)
    }
}

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(mut writer: W, width: u32, height: u32, fps: u32) -> Result<Self> {
        let fps = fps.max(1);
        let suggested = width * height * 3;

        writer.write_all(b"RIFF")?;
        let riff_size_pos = writer.stream_position()?;
        put_u32(&mut writer, 0)?; // patched on finish
        writer.write_all(b"AVI ")?;

        // LIST hdrl: 4 (fourcc) + 64 (avih) + 124 (LIST strl)
        writer.write_all(b"LIST")?;
        put_u32(&mut writer, 4 + 64 + 124)?;
        writer.write_all(b"hdrl")?;

        writer.write_all(b"avih")?;
        put_u32(&mut writer, 56)?;
        put_u32(&mut writer, 1_000_000 / fps)?; // microseconds per frame
        put_u32(&mut writer, 0)?; // max bytes per second
        put_u32(&mut writer, 0)?; // padding granularity
        put_u32(&mut writer, AVIF_HASINDEX)?;
        let total_frames_pos = writer.stream_position()?;
        put_u32(&mut writer, 0)?; // total frames, patched on finish
        put_u32(&mut writer, 0)?; // initial frames
        put_u32(&mut writer, 1)?; // stream count
        put_u32(&mut writer, suggested)?;
        put_u32(&mut writer, width)?;
        put_u32(&mut writer, height)?;
        put_u32(&mut writer, 0)?; // reserved x4
        put_u32(&mut writer, 0)?;
        put_u32(&mut writer, 0)?;
        put_u32(&mut writer, 0)?;

        // LIST strl: 4 (fourcc) + 64 (strh) + 48 (strf)
        writer.write_all(b"LIST")?;
        put_u32(&mut writer, 4 + 64 + 48)?;
        writer.write_all(b"strl")?;

        writer.write_all(b"strh")?;
        put_u32(&mut writer, 56)?;
        writer.write_all(b"vids")?;
        writer.write_all(b"MJPG")?;
        put_u32(&mut writer, 0)?; // flags
        put_u16(&mut writer, 0)?; // priority
        put_u16(&mut writer, 0)?; // language
        put_u32(&mut writer, 0)?; // initial frames
        put_u32(&mut writer, 1)?; // scale
        put_u32(&mut writer, fps)?; // rate: rate/scale = fps
        put_u32(&mut writer, 0)?; // start
        let length_pos = writer.stream_position()?;
        put_u32(&mut writer, 0)?; // length in frames, patched on finish
        put_u32(&mut writer, suggested)?;
        put_u32(&mut writer, 0)?; // quality
        put_u32(&mut writer, 0)?; // sample size
        put_u16(&mut writer, 0)?; // rcFrame: left, top, right, bottom
        put_u16(&mut writer, 0)?;
        put_u16(&mut writer, width as u16)?;
        put_u16(&mut writer, height as u16)?;

        writer.write_all(b"strf")?;
        put_u32(&mut writer, 40)?;
        put_u32(&mut writer, 40)?; // biSize
        put_u32(&mut writer, width)?;
        put_u32(&mut writer, height)?;
        put_u16(&mut writer, 1)?; // planes
        put_u16(&mut writer, 24)?; // bit count
        writer.write_all(b"MJPG")?; // biCompression
        put_u32(&mut writer, suggested)?; // biSizeImage
        put_u32(&mut writer, 0)?; // x pels per meter
        put_u32(&mut writer, 0)?; // y pels per meter
        put_u32(&mut writer, 0)?; // clr used
        put_u32(&mut writer, 0)?; // clr important

        writer.write_all(b"LIST")?;
        let movi_size_pos = writer.stream_position()?;
        put_u32(&mut writer, 0)?; // patched on finish
        let movi_fourcc_pos = writer.stream_position()?;
        writer.write_all(b"movi")?;

        Ok(Self {
            writer,
            fps,
            index: Vec::new(),
            riff_size_pos,
            total_frames_pos,
            length_pos,
            movi_size_pos,
            movi_fourcc_pos,
        })
    }

    /// Append one JPEG-encoded frame.
    ///
    /// A frame that would put any part of its chunk out of 32-bit reach is
    /// refused before a byte goes out, so the file stays finishable.
    pub fn write_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        let chunk_pos = self.writer.stream_position()?;
        let size = riff_size(jpeg.len() as u64)?;
        let offset = riff_size(chunk_pos - self.movi_fourcc_pos)?;
        let padded = 8 + u64::from(size) + u64::from(size % 2);
        riff_size(u64::from(offset) + padded)?;
        self.writer.write_all(b"00dc")?;
        put_u32(&mut self.writer, size)?;
        self.writer.write_all(jpeg)?;
        if jpeg.len() % 2 == 1 {
            self.writer.write_all(&[0])?;
        }
        self.index.push(IndexEntry { offset, size });
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.index.len()
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Write the index and patch every placeholder size. Must be called once;
    /// a file left unfinished has a zeroed header and no index.
    pub fn finish(mut self) -> Result<W> {
        let movi_end = self.writer.stream_position()?;
        let movi_size = riff_size(movi_end - self.movi_fourcc_pos)?;
        let index_size = riff_size(self.index.len() as u64 * 16)?;

        self.writer.write_all(b"idx1")?;
        put_u32(&mut self.writer, index_size)?;
        for entry in &self.index {
            self.writer.write_all(b"00dc")?;
            put_u32(&mut self.writer, AVIIF_KEYFRAME)?;
            put_u32(&mut self.writer, entry.offset)?;
            put_u32(&mut self.writer, entry.size)?;
        }
        let file_end = self.writer.stream_position()?;
        let riff_total = riff_size(file_end - 8)?;

        self.writer.seek(SeekFrom::Start(self.riff_size_pos))?;
        put_u32(&mut self.writer, riff_total)?;
        self.writer.seek(SeekFrom::Start(self.total_frames_pos))?;
        put_u32(&mut self.writer, self.index.len() as u32)?;
        self.writer.seek(SeekFrom::Start(self.length_pos))?;
        put_u32(&mut self.writer, self.index.len() as u32)?;
        self.writer.seek(SeekFrom::Start(self.movi_size_pos))?;
        put_u32(&mut self.writer, movi_size)?;

        self.writer.seek(SeekFrom::Start(file_end))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}
