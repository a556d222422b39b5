//! # S-EBXA index-page handling
//!
//! Two operations on a START file's index page, grounded directly on
//! `ebzip/sebxa.c`: a read-only probe that recovers the four offsets Zio's
//! `SEBXA` variant needs, and a destructive in-place rewrite that deletes
//! the two index entries describing the now-absent embedded compression.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{EbzipError, EbzipResult};
use crate::zio::{SebxaWindow, EB_PAGE};

const INDEX_ENTRY_LEN: usize = 16;
/// Upper bound on how many 16-byte entries fit after the 16-byte page
/// header in one 2048-byte page. `index_count` (`buf[1]`) is an untrusted
/// byte and can claim up to 255; without this clamp a page whose first
/// bytes aren't a genuine index page indexes past the fixed-size buffer.
const MAX_INDEX_ENTRIES: usize = (EB_PAGE as usize - 16) / INDEX_ENTRY_LEN;

fn be4(buf: &[u8]) -> u64 {
    ((buf[0] as u64) << 24) | ((buf[1] as u64) << 16) | ((buf[2] as u64) << 8) | buf[3] as u64
}

fn page_offset(index_page: u32) -> u64 {
    let page = if index_page == 0 { 1 } else { index_page };
    (page as u64 - 1) * EB_PAGE
}

fn read_page(file: &mut File, path: &Path, offset: u64) -> EbzipResult<[u8; EB_PAGE as usize]> {
    file.seek(SeekFrom::Start(offset)).map_err(|e| EbzipError::io(path, e))?;
    let mut buf = [0u8; EB_PAGE as usize];
    file.read_exact(&mut buf).map_err(|_| EbzipError::UnexpectedEof { path: path.to_path_buf() })?;
    Ok(buf)
}

/// Read-only probe of the index page at `index_page`, recovering the
/// logical zio window (entry code `0x00`) and the S-EBXA compression
/// region's `index_base`/`index_location` (codes `0x21`/`0x22`). Entries
/// with other codes are ignored here; the speedup planner (`speedup.rs`)
/// walks the same page independently for codes `0x90..0x92`.
pub fn get_sebxa_indexes(path: &Path, index_page: u32) -> EbzipResult<SebxaWindow> {
    let mut file = File::open(path).map_err(|e| EbzipError::io(path, e))?;
    let buf = read_page(&mut file, path, page_offset(index_page))?;

    let mut window = SebxaWindow::default();
    let index_count = (buf[1] as usize).min(MAX_INDEX_ENTRIES);
    for i in 0..index_count {
        let entry = &buf[16 + i * INDEX_ENTRY_LEN..16 + (i + 1) * INDEX_ENTRY_LEN];
        let page = be4(&entry[2..6]);
        let page_count = be4(&entry[6..10]);
        match entry[0] {
            0x00 => {
                window.zio_start = (page - 1) * EB_PAGE;
                window.zio_end = (page + page_count - 1) * EB_PAGE - 1;
            }
            0x21 => window.index_base = (page - 1) * EB_PAGE,
            0x22 => window.index_location = (page - 1) * EB_PAGE,
            _ => {}
        }
    }
    Ok(window)
}

/// Delete the S-EBXA compression-information entries (codes `0x21`/`0x22`)
/// from the index page at `index_page`, compacting the remaining entries
/// forward and zero-filling the freed tail. Must run only after the
/// START file's body has already been decompressed: this rewrite is
/// destructive and in-place.
pub fn rewrite_sebxa_start(path: &Path, index_page: u32) -> EbzipResult<()> {
    let offset = page_offset(index_page);
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| EbzipError::io(path, e))?;
    let mut buf = read_page(&mut file, path, offset)?;

    let index_count = (buf[1] as usize).min(MAX_INDEX_ENTRIES);
    let mut removed = 0usize;
    let mut out_pos = 16usize;
    for i in 0..index_count {
        let in_pos = 16 + i * INDEX_ENTRY_LEN;
        let code = buf[in_pos];
        if code == 0x21 || code == 0x22 {
            removed += 1;
        } else {
            if in_pos != out_pos {
                let entry: [u8; INDEX_ENTRY_LEN] =
                    buf[in_pos..in_pos + INDEX_ENTRY_LEN].try_into().expect("fixed width");
                buf[out_pos..out_pos + INDEX_ENTRY_LEN].copy_from_slice(&entry);
            }
            out_pos += INDEX_ENTRY_LEN;
        }
    }
    for _ in 0..removed {
        buf[out_pos..out_pos + INDEX_ENTRY_LEN].fill(0);
        out_pos += INDEX_ENTRY_LEN;
    }
    buf[1] = (index_count - removed) as u8;

    file.seek(SeekFrom::Start(offset)).map_err(|e| EbzipError::io(path, e))?;
    file.write_all(&buf).map_err(|e| EbzipError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn entry(code: u8, page: u32, page_count: u32) -> [u8; INDEX_ENTRY_LEN] {
        let mut e = [0u8; INDEX_ENTRY_LEN];
        e[0] = code;
        e[2..6].copy_from_slice(&page.to_be_bytes());
        e[6..10].copy_from_slice(&page_count.to_be_bytes());
        e
    }

    fn synthetic_page(codes: &[(u8, u32, u32)]) -> Vec<u8> {
        let mut page = vec![0u8; EB_PAGE as usize];
        page[1] = codes.len() as u8;
        for (i, (code, p, c)) in codes.iter().enumerate() {
            let off = 16 + i * INDEX_ENTRY_LEN;
            page[off..off + INDEX_ENTRY_LEN].copy_from_slice(&entry(*code, *p, *c));
        }
        page
    }

    #[test]
    fn rewrite_drops_0x21_and_0x22_and_decrements_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("START");
        let page = synthetic_page(&[(0x00, 1, 100), (0x21, 50, 1), (0x22, 51, 1), (0x90, 2, 10)]);
        std::fs::write(&path, &page).unwrap();

        rewrite_sebxa_start(&path, 1).unwrap();

        let rewritten = std::fs::read(&path).unwrap();
        assert_eq!(rewritten[1], 2);
        assert_eq!(rewritten[16], 0x00);
        assert_eq!(rewritten[16 + INDEX_ENTRY_LEN], 0x90);
        for b in &rewritten[16 + 2 * INDEX_ENTRY_LEN..16 + 4 * INDEX_ENTRY_LEN] {
            assert_eq!(*b, 0);
        }
        assert_eq!(rewritten.len(), EB_PAGE as usize);
    }

    #[test]
    fn probe_recovers_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("START");
        let page = synthetic_page(&[(0x00, 3, 5), (0x21, 10, 1), (0x22, 11, 1)]);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&page).unwrap();
        drop(f);

        let window = get_sebxa_indexes(&path, 1).unwrap();
        assert_eq!(window.zio_start, 2 * EB_PAGE);
        assert_eq!(window.zio_end, (3 + 5 - 1) * EB_PAGE - 1);
        assert_eq!(window.index_base, 9 * EB_PAGE);
        assert_eq!(window.index_location, 10 * EB_PAGE);
    }
}
