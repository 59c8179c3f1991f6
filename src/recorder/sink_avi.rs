// src/recorder/sink_avi.rs
//
// MJPEG in AVI 1.0 (RIFF). Header sizes and frame counts are written as zero
// and patched in `finalize`, the same way a WAV writer fixes up its lengths.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub const AVI_EXTENSION: &str = "avi";

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const CHUNK_ID: &[u8; 4] = b"00dc";

/// RIFF sizes are 32 bit; the rotator starts a new file before this.
pub const MAX_RIFF_BYTES: u64 = 0xF000_0000;

#[derive(Debug, Clone, Copy)]
struct HeaderOffsets {
    riff_size: u64,
    total_frames: u64,
    avih_buffer: u64,
    stream_length: u64,
    strh_buffer: u64,
    movi_size: u64,
}

struct IndexEntry {
    offset: u32,
    size: u32,
}

pub struct MjpegAviWriter {
    out: BufWriter<File>,
    path: PathBuf,
    width: u32,
    height: u32,
    offsets: HeaderOffsets,
    index: Vec<IndexEntry>,
    movi_bytes: u64,
    file_bytes: u64,
    max_chunk: u32,
    finalized: bool,
}

impl MjpegAviWriter {
    pub fn create(file: File, path: PathBuf, width: u32, height: u32, fps: u32) -> io::Result<Self> {
        let (header, offsets) = build_header(width, height, fps.max(1));
        let mut out = BufWriter::new(file);
        out.write_all(&header)?;

        Ok(Self {
            out,
            path,
            width,
            height,
            offsets,
            index: Vec::new(),
            movi_bytes: 0,
            file_bytes: header.len() as u64,
            max_chunk: 0,
            finalized: false,
        })
    }

    pub fn write_frame(&mut self, jpeg: &[u8]) -> io::Result<()> {
        let size = u32::try_from(jpeg.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame larger than 4 GiB"))?;
        // Offsets im idx1 zählen ab dem 'movi'-FourCC
        let offset = (4 + self.movi_bytes) as u32;

        self.out.write_all(CHUNK_ID)?;
        self.out.write_u32::<LittleEndian>(size)?;
        self.out.write_all(jpeg)?;
        let pad = (jpeg.len() % 2) as u64;
        if pad == 1 {
            self.out.write_u8(0)?;
        }

        let written = 8 + jpeg.len() as u64 + pad;
        self.movi_bytes += written;
        self.file_bytes += written;
        self.max_chunk = self.max_chunk.max(size);
        self.index.push(IndexEntry { offset, size });
        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.index.len() as u32
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once another frame plus the index could overflow the RIFF size.
    pub fn is_full(&self) -> bool {
        let index_bytes = 16 * (self.index.len() as u64 + 1);
        self.file_bytes + index_bytes + u64::from(self.max_chunk) + 8 >= MAX_RIFF_BYTES
    }

    /// Writes the index and patches the header. Returns the final file size.
    pub fn finalize(mut self) -> io::Result<u64> {
        self.finish()
    }

    fn finish(&mut self) -> io::Result<u64> {
        self.finalized = true;

        self.out.write_all(b"idx1")?;
        self.out.write_u32::<LittleEndian>(16 * self.index.len() as u32)?;
        for entry in &self.index {
            self.out.write_all(CHUNK_ID)?;
            self.out.write_u32::<LittleEndian>(AVIIF_KEYFRAME)?;
            self.out.write_u32::<LittleEndian>(entry.offset)?;
            self.out.write_u32::<LittleEndian>(entry.size)?;
        }
        let total = self.file_bytes + 8 + 16 * self.index.len() as u64;

        let frames = self.index.len() as u32;
        let o = self.offsets;
        self.patch(o.riff_size, (total - 8) as u32)?;
        self.patch(o.total_frames, frames)?;
        self.patch(o.avih_buffer, self.max_chunk)?;
        self.patch(o.stream_length, frames)?;
        self.patch(o.strh_buffer, self.max_chunk)?;
        self.patch(o.movi_size, (4 + self.movi_bytes) as u32)?;

        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        Ok(total)
    }

    fn patch(&mut self, at: u64, value: u32) -> io::Result<()> {
        self.out.seek(SeekFrom::Start(at))?;
        self.out.write_u32::<LittleEndian>(value)
    }
}

impl Drop for MjpegAviWriter {
    fn drop(&mut self) {
        if !self.finalized {
            if let Err(e) = self.finish() {
                log::warn!("[avi_sink] finalize on drop failed for {:?}: {}", self.path, e);
            }
        }
    }
}

fn build_header(width: u32, height: u32, fps: u32) -> (Vec<u8>, HeaderOffsets) {
    fn u32le(b: &mut Vec<u8>, v: u32) {
        b.extend_from_slice(&v.to_le_bytes());
    }

    let mut b: Vec<u8> = Vec::with_capacity(256);

    b.extend_from_slice(b"RIFF");
    let riff_size = b.len() as u64;
    u32le(&mut b, 0);
    b.extend_from_slice(b"AVI ");

    b.extend_from_slice(b"LIST");
    let hdrl_size = b.len();
    u32le(&mut b, 0);
    b.extend_from_slice(b"hdrl");

    b.extend_from_slice(b"avih");
    u32le(&mut b, 56);
    u32le(&mut b, 1_000_000 / fps);
    u32le(&mut b, 0);
    u32le(&mut b, 0);
    u32le(&mut b, AVIF_HASINDEX);
    let total_frames = b.len() as u64;
    u32le(&mut b, 0);
    u32le(&mut b, 0);
    u32le(&mut b, 1);
    let avih_buffer = b.len() as u64;
    u32le(&mut b, 0);
    u32le(&mut b, width);
    u32le(&mut b, height);
    for _ in 0..4 {
        u32le(&mut b, 0);
    }

    b.extend_from_slice(b"LIST");
    let strl_size = b.len();
    u32le(&mut b, 0);
    b.extend_from_slice(b"strl");

    b.extend_from_slice(b"strh");
    u32le(&mut b, 56);
    b.extend_from_slice(b"vids");
    b.extend_from_slice(b"MJPG");
    u32le(&mut b, 0);
    b.extend_from_slice(&0u16.to_le_bytes());
    b.extend_from_slice(&0u16.to_le_bytes());
    u32le(&mut b, 0);
    u32le(&mut b, 1);
    u32le(&mut b, fps);
    u32le(&mut b, 0);
    let stream_length = b.len() as u64;
    u32le(&mut b, 0);
    let strh_buffer = b.len() as u64;
    u32le(&mut b, 0);
    u32le(&mut b, u32::MAX);
    u32le(&mut b, 0);
    for v in [0, 0, width as u16, height as u16] {
        b.extend_from_slice(&v.to_le_bytes());
    }

    b.extend_from_slice(b"strf");
    u32le(&mut b, 40);
    u32le(&mut b, 40);
    u32le(&mut b, width);
    u32le(&mut b, height);
    b.extend_from_slice(&1u16.to_le_bytes());
    b.extend_from_slice(&24u16.to_le_bytes());
    b.extend_from_slice(b"MJPG");
    u32le(&mut b, width.saturating_mul(height).saturating_mul(3));
    for _ in 0..4 {
        u32le(&mut b, 0);
    }

    let strl_len = (b.len() - strl_size - 4) as u32;
    b[strl_size..strl_size + 4].copy_from_slice(&strl_len.to_le_bytes());
    let hdrl_len = (b.len() - hdrl_size - 4) as u32;
    b[hdrl_size..hdrl_size + 4].copy_from_slice(&hdrl_len.to_le_bytes());

    b.extend_from_slice(b"LIST");
    let movi_size = b.len() as u64;
    u32le(&mut b, 0);
    b.extend_from_slice(b"movi");

    let offsets = HeaderOffsets {
        riff_size,
        total_frames,
        avih_buffer,
        stream_length,
        strh_buffer,
        movi_size,
    };
    (b, offsets)
}

/// Summary read back from a finished file's headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AviInfo {
    pub frames: u32,
    pub width: u32,
    pub height: u32,
}

pub fn read_avi_info(path: &Path) -> io::Result<AviInfo> {
    let (_, offsets) = build_header(1, 1, 1);
    let mut f = File::open(path)?;
    let mut fourcc = [0u8; 4];

    f.read_exact(&mut fourcc)?;
    let _riff = f.read_u32::<LittleEndian>()?;
    let mut kind = [0u8; 4];
    f.read_exact(&mut kind)?;
    if &fourcc != b"RIFF" || &kind != b"AVI " {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not an AVI file"));
    }

    f.seek(SeekFrom::Start(offsets.total_frames))?;
    let frames = f.read_u32::<LittleEndian>()?;
    // width/height folgen auf dwSuggestedBufferSize
    f.seek(SeekFrom::Start(offsets.avih_buffer + 4))?;
    let width = f.read_u32::<LittleEndian>()?;
    let height = f.read_u32::<LittleEndian>()?;

    Ok(AviInfo {
        frames,
        width,
        height,
    })
}
