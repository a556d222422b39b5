//! # Container I/O (`Zio`)
//!
//! A tagged-variant façade over a physical file, abstracting away whether
//! the bytes on disk are plain, EBZIP1-sliced, an EPWING/EPWING6 container,
//! or an S-EBXA START file. Random-access `seek`+`read` always operates on
//! the *logical* (decompressed) stream; `Zio` hides the slice index lookup
//! and on-demand inflate from callers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::{EbzipError, EbzipResult};

pub const EB_PAGE: u64 = 2048;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ZioKind {
    Plain,
    Ebzip1,
    Epwing,
    Epwing6,
    Sebxa,
    Invalid,
}

/// The four offsets recovered from an S-EBXA index-page probe (§4.4).
/// Carried on the `Sebxa` variant rather than modeled through inheritance.
#[derive(Clone, Copy, Default, Debug)]
pub struct SebxaWindow {
    pub index_location: u64,
    pub index_base: u64,
    pub zio_start: u64,
    pub zio_end: u64,
}

struct Ebzip1Header {
    version: u8,
    level: u8,
    file_size: u64,
    crc: u32,
    mtime: u32,
    index_width: u8,
}

pub const HEADER_LEN: u64 = 22;

/// Choose the slice-index entry width for a given logical file size, per
/// the thresholds in §3.1: 2/3/4/5 bytes below 2^16/2^24/2^32/otherwise.
pub fn index_width_for(file_size: u64) -> u8 {
    if file_size < (1u64 << 16) {
        2
    } else if file_size < (1u64 << 24) {
        3
    } else if file_size < (1u64 << 32) {
        4
    } else {
        5
    }
}

fn read_be(buf: &[u8]) -> u64 {
    buf.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

fn write_be(value: u64, width: usize, out: &mut [u8]) {
    for i in 0..width {
        out[width - 1 - i] = ((value >> (8 * i)) & 0xff) as u8;
    }
}

fn parse_header(buf: &[u8; HEADER_LEN as usize], path: &Path) -> EbzipResult<Ebzip1Header> {
    if &buf[0..5] != b"EBZip" {
        return Err(EbzipError::BadContainer { path: path.to_path_buf() });
    }
    let version = buf[5] >> 4;
    let level = buf[5] & 0x0f;
    if version != 1 && version != 2 {
        return Err(EbzipError::BadContainer { path: path.to_path_buf() });
    }
    let file_size = if version == 2 {
        (buf[9] as u64) << 32 | read_be(&buf[10..14])
    } else {
        read_be(&buf[10..14])
    };
    let crc = read_be(&buf[14..18]) as u32;
    let mtime = read_be(&buf[18..22]) as u32;
    let index_width = index_width_for(file_size);
    Ok(Ebzip1Header { version, level, file_size, crc, mtime, index_width })
}

/// One open physical file, dispatched over its container kind.
pub struct Zio {
    file: File,
    path: PathBuf,
    pub kind: ZioKind,
    pub file_size: u64,
    pub slice_size: u64,
    index_width: u8,
    index: Vec<u64>,
    pub crc: u32,
    pub mtime: u32,
    pos: u64,
    sebxa: Option<SebxaWindow>,
    cached_slice: Option<(u64, Vec<u8>)>,
}

impl Zio {
    /// Open `path` read-only and sniff its container kind from the first
    /// bytes. `PLAIN` is assumed unless the EBZip magic is present.
    pub fn open(path: &Path) -> EbzipResult<Self> {
        let mut file = File::open(path).map_err(|e| EbzipError::io(path, e))?;
        let metadata = file.metadata().map_err(|e| EbzipError::io(path, e))?;
        let on_disk_len = metadata.len();

        let mut probe = [0u8; HEADER_LEN as usize];
        let probed = if on_disk_len >= HEADER_LEN {
            file.read_exact(&mut probe).map_err(|e| EbzipError::io(path, e))?;
            true
        } else {
            false
        };

        if probed && &probe[0..5] == b"EBZip" {
            let header = parse_header(&probe, path)?;
            let slice_size = EB_PAGE << header.level;
            let n = if header.file_size == 0 {
                0
            } else {
                (header.file_size + slice_size - 1) / slice_size
            };
            let index = read_index(&mut file, path, n, header.index_width as usize)?;
            return Ok(Zio {
                file,
                path: path.to_path_buf(),
                kind: ZioKind::Ebzip1,
                file_size: header.file_size,
                slice_size,
                index_width: header.index_width,
                index,
                crc: header.crc,
                mtime: header.mtime,
                pos: 0,
                sebxa: None,
                cached_slice: None,
            });
        }

        file.seek(SeekFrom::Start(0)).map_err(|e| EbzipError::io(path, e))?;
        Ok(Zio {
            file,
            path: path.to_path_buf(),
            kind: ZioKind::Plain,
            file_size: on_disk_len,
            slice_size: on_disk_len.max(1),
            index_width: 0,
            index: Vec::new(),
            crc: 1,
            mtime: 0,
            pos: 0,
            sebxa: None,
            cached_slice: None,
        })
    }

    /// Reinterpret an already-open plain file as an S-EBXA START file,
    /// attaching the probed window (§4.4). Called after `open` once the
    /// index-page probe has run.
    pub fn set_sebxa_mode(&mut self, window: SebxaWindow) {
        self.kind = ZioKind::Sebxa;
        self.sebxa = Some(window);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> ZioKind {
        self.kind
    }

    pub fn seek_logical(&mut self, offset: u64) {
        self.pos = offset;
    }

    /// Read up to `buf.len()` bytes from the logical stream starting at the
    /// current logical position, returning the number of bytes read (short
    /// only at end of file). For `EBZIP1`, slices are inflated on demand
    /// and the most recent one is cached; every other kind reads through
    /// directly.
    pub fn read(&mut self, buf: &mut [u8]) -> EbzipResult<usize> {
        match self.kind {
            ZioKind::Ebzip1 => self.read_ebzip1(buf),
            _ => self.read_passthrough(buf),
        }
    }

    fn read_passthrough(&mut self, buf: &mut [u8]) -> EbzipResult<usize> {
        self.file
            .seek(SeekFrom::Start(self.pos))
            .map_err(|e| EbzipError::io(&self.path, e))?;
        let n = read_fully_or_short(&mut self.file, buf).map_err(|e| EbzipError::io(&self.path, e))?;
        self.pos += n as u64;
        Ok(n)
    }

    fn read_ebzip1(&mut self, buf: &mut [u8]) -> EbzipResult<usize> {
        if self.pos >= self.file_size {
            return Ok(0);
        }
        let slice_no = self.pos / self.slice_size;
        let slice = self.decode_slice(slice_no)?;
        let within = (self.pos % self.slice_size) as usize;
        let avail = slice.len() - within;
        let n = buf.len().min(avail).min((self.file_size - self.pos) as usize);
        buf[..n].copy_from_slice(&slice[within..within + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn decode_slice(&mut self, slice_no: u64) -> EbzipResult<Vec<u8>> {
        if let Some((cached_no, cached)) = &self.cached_slice {
            if *cached_no == slice_no {
                return Ok(cached.clone());
            }
        }
        let start = self.index[slice_no as usize];
        let end = self.index[slice_no as usize + 1];
        let mut compressed = vec![0u8; (end - start) as usize];
        self.file
            .seek(SeekFrom::Start(start))
            .map_err(|e| EbzipError::io(&self.path, e))?;
        self.file
            .read_exact(&mut compressed)
            .map_err(|e| EbzipError::io(&self.path, e))?;
        let logical_len = if slice_no as u64 + 1 == self.index.len() as u64 - 1 {
            let remainder = self.file_size % self.slice_size;
            if remainder == 0 {
                self.slice_size as usize
            } else {
                remainder as usize
            }
        } else {
            self.slice_size as usize
        };
        let padded = codec::decompress_slice(&compressed, self.slice_size as usize);
        let truncated = padded[..logical_len].to_vec();
        self.cached_slice = Some((slice_no, truncated.clone()));
        Ok(truncated)
    }

    pub fn sebxa_window(&self) -> Option<SebxaWindow> {
        self.sebxa
    }

    /// Gives back the owned `File`, positioned at the start, for callers
    /// (the S-EBXA rewriter) that need raw page-level read/write access
    /// after the logical stream has been consumed.
    pub fn into_file(mut self) -> EbzipResult<File> {
        self.file.seek(SeekFrom::Start(0)).map_err(|e| EbzipError::io(&self.path, e))?;
        Ok(self.file)
    }
}

fn read_index(file: &mut File, path: &Path, n: u64, width: usize) -> EbzipResult<Vec<u64>> {
    let count = (n + 1) as usize;
    let mut raw = vec![0u8; count * width];
    file.seek(SeekFrom::Start(HEADER_LEN)).map_err(|e| EbzipError::io(path, e))?;
    file.read_exact(&mut raw).map_err(|e| EbzipError::io(path, e))?;
    Ok(raw.chunks(width).map(read_be).collect())
}

fn read_fully_or_short(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Encode a big-endian slice-index entry of `width` bytes into `out`.
pub fn encode_index_entry(value: u64, width: usize, out: &mut [u8]) {
    write_be(value, width, out);
}
