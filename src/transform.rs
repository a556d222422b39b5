//! # File transformer
//!
//! The three public per-file operations the book walker drives:
//! `zip_file`, `unzip_file`, `zipinfo_file`, plus the plain `copy_file`
//! used for catalog/movie members and for `PLAIN`-kind decompression.
//! Grounded on `ebzip/zipfile.c`, `ebzip/unzipfile.c`, `ebzip/copyfile.c`,
//! and `ebzip/zipinfofile.c`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use filetime::FileTime;

use crate::codec::{self, RunningCrc};
use crate::error::{EbzipError, EbzipResult};
use crate::run::{Overwrite, Run};
use crate::signal_trap;
use crate::zio::{self, SebxaWindow, Zio, ZioKind, EB_PAGE, HEADER_LEN};

/// Outcome of an attempted per-file operation, distinguishing a genuine
/// transform from a benign skip (declined overwrite, or input==output).
pub enum Outcome {
    Done,
    Skipped,
}

fn same_file(a: &Path, b: &Path) -> bool {
    let (Ok(ma), Ok(mb)) = (std::fs::metadata(a), std::fs::metadata(b)) else {
        return false;
    };
    ma.dev() == mb.dev() && ma.ino() == mb.ino()
}

/// Decide whether to proceed given an existing output path and the
/// configured overwrite policy. `CONFIRM` prompts on stdin, matching the
/// original's `yes/no` dialogue; under non-interactive use a CLI layer
/// should have already downgraded `CONFIRM` to `No` (§6.1: "when stdin is
/// not a terminal, the default overwrite policy becomes no").
fn check_overwrite(output: &Path, run: &Run) -> EbzipResult<bool> {
    if !output.exists() {
        return Ok(true);
    }
    match run.overwrite {
        Overwrite::Force => Ok(true),
        Overwrite::No => Ok(false),
        Overwrite::Confirm => {
            eprint!("overwrite {}? [y/n] ", output.display());
            std::io::stderr().flush().ok();
            let mut answer = String::new();
            std::io::stdin()
                .read_line(&mut answer)
                .map_err(|e| EbzipError::io(output, e))?;
            Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
        }
    }
}

fn preserve_times(input: &Path, output: &Path) {
    match std::fs::metadata(input) {
        Ok(meta) => {
            let atime = FileTime::from_last_access_time(&meta);
            let mtime = FileTime::from_last_modification_time(&meta);
            if let Err(e) = filetime::set_file_times(output, atime, mtime) {
                log::warn!("failed to preserve timestamps on {}: {}", output.display(), e);
            }
        }
        Err(e) => log::warn!("failed to stat {} for timestamps: {}", input.display(), e),
    }
}

/// Byte-for-byte copy, page at a time, preserving timestamps. Used for
/// catalog and movie members (never encoded) and for `PLAIN`-kind inputs
/// under `unzip_file`. Grounded on `ebzip/copyfile.c`.
pub fn copy_file(input: &Path, output: &Path, run: &Run) -> EbzipResult<Outcome> {
    if same_file(input, output) {
        log::info!("{} and {} are the same file, skipping", input.display(), output.display());
        return Ok(Outcome::Skipped);
    }
    if !check_overwrite(output, run)? {
        return Ok(Outcome::Skipped);
    }
    if !run.test {
        log::info!("==> copy {} <==", input.display());
    }

    let mut in_file = File::open(input).map_err(|e| EbzipError::io(input, e))?;
    if run.test {
        let mut buf = vec![0u8; EB_PAGE as usize];
        loop {
            let n = in_file.read(&mut buf).map_err(|e| EbzipError::io(input, e))?;
            if n == 0 {
                break;
            }
        }
        return Ok(Outcome::Done);
    }

    let mut out_file = create_output(output, run)?;
    signal_trap::arm(&out_file, output.to_path_buf()).map_err(|e| EbzipError::io(output, e))?;

    let mut buf = vec![0u8; EB_PAGE as usize];
    loop {
        let n = in_file.read(&mut buf).map_err(|e| EbzipError::io(input, e))?;
        if n == 0 {
            break;
        }
        out_file.write_all(&buf[..n]).map_err(|e| EbzipError::io(output, e))?;
    }
    drop(out_file);
    signal_trap::disarm();
    preserve_times(input, output);
    run.schedule_unlink(input.to_path_buf());
    Ok(Outcome::Done)
}

fn create_output(output: &Path, run: &Run) -> EbzipResult<File> {
    if run.test {
        unreachable!("test mode never creates output");
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
        .map_err(|e| EbzipError::io(output, e))
}

fn write_header(out: &mut File, level: u8, file_size: u64, output: &Path) -> EbzipResult<()> {
    let mut header = [0u8; HEADER_LEN as usize];
    header[0..5].copy_from_slice(b"EBZip");
    let version = if file_size >= (1u64 << 32) { 2 } else { 1 };
    header[5] = (version << 4) | (level & 0x0f);
    if version == 2 {
        header[9] = ((file_size >> 32) & 0xff) as u8;
    }
    header[10..14].copy_from_slice(&(file_size as u32).to_be_bytes());
    out.write_all(&header).map_err(|e| EbzipError::io(output, e))?;
    Ok(())
}

fn rewrite_header_tail(out: &mut File, crc: u32, mtime: u32, output: &Path) -> EbzipResult<()> {
    out.seek(SeekFrom::Start(14)).map_err(|e| EbzipError::io(output, e))?;
    out.write_all(&crc.to_be_bytes()).map_err(|e| EbzipError::io(output, e))?;
    out.write_all(&mtime.to_be_bytes()).map_err(|e| EbzipError::io(output, e))?;
    Ok(())
}

/// Compress `input` (in the given `source_kind`, already whatever passthrough
/// `Zio` presents logically) into the EBZIP1 container `output`. `sebxa`
/// is `Some` only for a START file that is itself S-EBXA; its window is
/// attached to the opened `Zio` so the logical stream already reflects the
/// decompressed view.
pub fn zip_file(
    input: &Path,
    source_kind: ZioKind,
    output: &Path,
    sebxa: Option<SebxaWindow>,
    speedup_index_page: Option<u32>,
    run: &Run,
) -> EbzipResult<Outcome> {
    if same_file(input, output) {
        return Ok(Outcome::Skipped);
    }
    if !check_overwrite(output, run)? {
        return Ok(Outcome::Skipped);
    }
    log::info!("==> compress {} <==", input.display());

    let mut zio = Zio::open(input)?;
    if source_kind == ZioKind::Sebxa {
        if let Some(window) = sebxa {
            zio.set_sebxa_mode(window);
        }
    }

    let level = run.level;
    let slice_size = run.slice_size();
    let file_size = zio.file_size;
    let n = if file_size == 0 { 0 } else { (file_size + slice_size - 1) / slice_size };
    let index_width = zio::index_width_for(file_size) as usize;

    if run.test {
        return test_read_through(&mut zio, n, slice_size);
    }

    let mut out_file = create_output(output, run)?;
    signal_trap::arm(&out_file, output.to_path_buf()).map_err(|e| EbzipError::io(output, e))?;

    write_header(&mut out_file, level, file_size, output)?;
    let zeroed_index = vec![0u8; (n as usize + 1) * index_width];
    out_file.write_all(&zeroed_index).map_err(|e| EbzipError::io(output, e))?;

    let mut crc = RunningCrc::new();
    let mut index_entries: Vec<u64> = Vec::with_capacity(n as usize + 1);
    let mut cursor = HEADER_LEN + zeroed_index.len() as u64;
    index_entries.push(cursor);

    let honmon_plan = match speedup_index_page {
        Some(index_page) => crate::speedup::SpeedupPlan::scan(input, index_page)
            .unwrap_or_else(|e| {
                log::warn!("speedup scan failed for {}: {}", input.display(), e);
                crate::speedup::SpeedupPlan::default()
            }),
        None => crate::speedup::SpeedupPlan::default(),
    };

    for slice_no in 0..n {
        zio.seek_logical(slice_no * slice_size);
        let mut raw = vec![0u8; slice_size as usize];
        let mut filled = 0usize;
        while filled < raw.len() {
            let got = zio.read(&mut raw[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        if filled < raw.len() {
            for b in &mut raw[filled..] {
                *b = 0;
            }
        }
        crc.update(&raw);

        let written = if honmon_plan.is_speedup_slice(slice_no, level) {
            raw.clone()
        } else {
            codec::compress_slice(&raw)
        };
        out_file.write_all(&written).map_err(|e| EbzipError::io(output, e))?;
        cursor += written.len() as u64;
        index_entries.push(cursor);
    }

    out_file.seek(SeekFrom::Start(HEADER_LEN)).map_err(|e| EbzipError::io(output, e))?;
    for entry in &index_entries {
        let mut buf = vec![0u8; index_width];
        zio::encode_index_entry(*entry, index_width, &mut buf);
        out_file.write_all(&buf).map_err(|e| EbzipError::io(output, e))?;
    }

    let mtime = std::fs::metadata(input)
        .map(|m| m.mtime() as u32)
        .unwrap_or(0);
    rewrite_header_tail(&mut out_file, crc.finish(), mtime, output)?;

    drop(out_file);
    signal_trap::disarm();
    preserve_times(input, output);
    run.schedule_unlink(input.to_path_buf());
    Ok(Outcome::Done)
}

fn test_read_through(zio: &mut Zio, n: u64, slice_size: u64) -> EbzipResult<Outcome> {
    for slice_no in 0..n {
        zio.seek_logical(slice_no * slice_size);
        let mut buf = vec![0u8; slice_size as usize];
        let mut filled = 0usize;
        while filled < buf.len() {
            let got = zio.read(&mut buf[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
    }
    Ok(Outcome::Done)
}

/// Decompress `input` into `output`. If the input's container kind is
/// `PLAIN`, delegates to `copy_file`. Otherwise reads the logical stream
/// slice by slice, verifying the accumulated Adler-32 against the header
/// CRC when the kind was `EBZIP1`.
pub fn unzip_file(
    input: &Path,
    source_kind: ZioKind,
    output: &Path,
    sebxa: Option<SebxaWindow>,
    run: &Run,
) -> EbzipResult<Outcome> {
    if source_kind == ZioKind::Plain {
        return copy_file(input, output, run);
    }
    if same_file(input, output) {
        return Ok(Outcome::Skipped);
    }
    if !check_overwrite(output, run)? {
        return Ok(Outcome::Skipped);
    }
    log::info!("==> uncompress {} <==", input.display());

    let mut zio = Zio::open(input)?;
    if source_kind == ZioKind::Sebxa {
        if let Some(window) = sebxa {
            zio.set_sebxa_mode(window);
        }
    }
    let check_crc = zio.mode() == ZioKind::Ebzip1;
    let header_crc = zio.crc;
    let slice_size = zio.slice_size;
    let file_size = zio.file_size;
    let n = if file_size == 0 { 0 } else { (file_size + slice_size - 1) / slice_size };

    if run.test {
        return test_read_through(&mut zio, n, slice_size);
    }

    let mut out_file = create_output(output, run)?;
    signal_trap::arm(&out_file, output.to_path_buf()).map_err(|e| EbzipError::io(output, e))?;

    let mut crc = RunningCrc::new();
    let mut remaining = file_size;
    for slice_no in 0..n {
        zio.seek_logical(slice_no * slice_size);
        let want = slice_size.min(remaining) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0usize;
        while filled < want {
            let got = zio.read(&mut buf[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        // The header CRC was accumulated over zero-padded slice_size chunks
        // (§3.2); replicate the padding here so a short final slice still
        // hashes to the same value, even though only the real bytes below
        // are written to the output file.
        if (filled as u64) < slice_size {
            let mut padded = buf[..filled].to_vec();
            padded.resize(slice_size as usize, 0);
            crc.update(&padded);
        } else {
            crc.update(&buf[..filled]);
        }
        out_file.write_all(&buf[..filled]).map_err(|e| EbzipError::io(output, e))?;
        remaining -= filled as u64;
    }

    if check_crc && crc.finish() != header_crc {
        drop(out_file);
        let _ = std::fs::remove_file(output);
        signal_trap::disarm();
        log::error!("{}: CRC error", input.display());
        return Err(EbzipError::CrcMismatch { path: input.to_path_buf() });
    }

    drop(out_file);
    signal_trap::disarm();
    preserve_times(input, output);
    run.schedule_unlink(input.to_path_buf());
    Ok(Outcome::Done)
}

/// Print a one-line summary without modifying anything. `PLAIN` files
/// report their size; `EBZIP1` files report logical/physical size, ratio,
/// and level. An empty input is reported specially.
pub fn zipinfo_file(input: &Path) -> EbzipResult<()> {
    println!("{}:", input.display());
    let metadata = std::fs::metadata(input).map_err(|e| EbzipError::io(input, e))?;
    if metadata.len() == 0 {
        println!("  empty original file");
        return Ok(());
    }
    let zio = Zio::open(input)?;
    match zio.mode() {
        ZioKind::Plain => {
            println!("  {} bytes", zio.file_size);
        }
        ZioKind::Ebzip1 => {
            let physical = metadata.len();
            let ratio = if zio.file_size == 0 {
                0.0
            } else {
                100.0 * physical as f64 / zio.file_size as f64
            };
            let level = (zio.slice_size / EB_PAGE).trailing_zeros();
            println!(
                "  {} -> {} ({:.1}%, ebzip1 level {})",
                zio.file_size, physical, ratio, level
            );
        }
        other => {
            println!("  {} bytes ({:?}, passthrough)", zio.file_size, other);
        }
    }
    Ok(())
}
