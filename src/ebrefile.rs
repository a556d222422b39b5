//! # Catalog refiling
//!
//! Rewrites a book's `CATALOG`/`CATALOGS` file to drop every subbook not
//! named in a filter list, the same byte surgery `ebrefile.c`'s
//! `refile_catalog()` performs: copy the header, copy each subbook's basic
//! record only if it is kept, copy the EPWING extended-information record
//! in lock-step with the same keep decision, then copy the remainder of the
//! catalog file verbatim.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::catalog::{self, DiscKind, CATALOG_HEADER_LEN, EB_SIZE_PAGE};
use crate::error::{EbzipError, EbzipResult};

const EB_SUBBOOK_INVALID: i32 = -1;

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_stem().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Rewrite the catalog of the book at `book_path`, keeping only subbooks
/// whose directory name matches (case-insensitively) a name in
/// `subbook_names`. An empty filter keeps every subbook, matching the
/// `subbook_name_count == 0` convention.
pub fn refile(book_path: &Path, output_dir: &Path, subbook_names: &[String]) -> EbzipResult<()> {
    let disc_kind = catalog::detect_disc_kind(book_path)?;
    let catalog_name = catalog::find_file_name(book_path, disc_kind.catalog_file_name())
        .expect("detect_disc_kind already confirmed presence");
    let in_file_name = book_path.join(&catalog_name);
    let out_file_name = output_dir.join(&catalog_name);
    let old_file_name = with_suffix(&out_file_name, ".old");
    let tmp_file_name = with_suffix(&out_file_name, ".tmp");

    if !old_file_name.exists() && is_regular_file(&out_file_name) {
        std::fs::copy(&out_file_name, &old_file_name).map_err(|e| EbzipError::io(&old_file_name, e))?;
    }

    if let Err(e) = refile_catalog(&tmp_file_name, &in_file_name, disc_kind, subbook_names) {
        let _ = std::fs::remove_file(&tmp_file_name);
        let _ = std::fs::rename(&old_file_name, &out_file_name);
        return Err(e);
    }

    std::fs::rename(&tmp_file_name, &out_file_name).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_file_name);
        EbzipError::io(&out_file_name, e)
    })?;

    Ok(())
}

/// Find the index of `directory_name` (case-insensitive, trailing spaces
/// ignored) within `subbook_names`, or `EB_SUBBOOK_INVALID` if absent.
fn find_subbook_name(subbook_names: &[String], directory_name: &str) -> i32 {
    let pattern = directory_name.trim();
    subbook_names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(pattern))
        .map(|i| i as i32)
        .unwrap_or(EB_SUBBOOK_INVALID)
}

fn refile_catalog(
    out_catalog_name: &Path,
    in_catalog_name: &Path,
    disc_kind: DiscKind,
    subbook_names: &[String],
) -> EbzipResult<()> {
    let catalog_size = disc_kind.record_size();

    let mut in_file = File::open(in_catalog_name).map_err(|e| EbzipError::io(in_catalog_name, e))?;
    if let Some(parent) = out_catalog_name.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EbzipError::io(parent, e))?;
    }
    let mut out_file =
        File::create(out_catalog_name).map_err(|e| EbzipError::io(out_catalog_name, e))?;

    let mut header = [0u8; CATALOG_HEADER_LEN];
    in_file.read_exact(&mut header).map_err(|e| EbzipError::io(in_catalog_name, e))?;
    let in_subbook_count = ((header[0] as usize) << 8) | header[1] as usize;
    out_file.write_all(&header).map_err(|e| EbzipError::io(out_catalog_name, e))?;

    // `subbook_map[i]` records which requested name (by index) subbook `i`
    // matched, or `EB_SUBBOOK_INVALID` if it was dropped. This both drives
    // the EPWING extended-information pass and the "no such subbook"
    // warning pass below, mirroring `subbbook_map_table` in the original.
    let mut subbook_map = vec![EB_SUBBOOK_INVALID; in_subbook_count];
    let mut retained = 0usize;

    for i in 0..in_subbook_count {
        let mut record = vec![0u8; catalog_size];
        in_file.read_exact(&mut record).map_err(|e| EbzipError::io(in_catalog_name, e))?;
        let directory_name = catalog::directory_name_from_record(&record, disc_kind);

        if subbook_names.is_empty() {
            subbook_map[i] = i as i32;
        } else {
            let matched = find_subbook_name(subbook_names, &directory_name);
            if matched < 0 {
                continue;
            }
            subbook_map[i] = matched;
        }

        out_file.write_all(&record).map_err(|e| EbzipError::io(out_catalog_name, e))?;
        retained += 1;
    }

    if disc_kind == DiscKind::Epwing {
        for i in 0..in_subbook_count {
            let mut record = vec![0u8; catalog_size];
            in_file.read_exact(&mut record).map_err(|e| EbzipError::io(in_catalog_name, e))?;
            if subbook_map[i] == EB_SUBBOOK_INVALID {
                continue;
            }
            out_file.write_all(&record).map_err(|e| EbzipError::io(out_catalog_name, e))?;
        }
    }

    for (i, name) in subbook_names.iter().enumerate() {
        if !subbook_map.iter().any(|&m| m == i as i32) {
            log::warn!("no such subbook: {name}");
        }
    }

    std::io::copy(&mut in_file, &mut out_file).map_err(|e| EbzipError::io(out_catalog_name, e))?;

    let out_len = out_file.stream_position().map_err(|e| EbzipError::io(out_catalog_name, e))?;
    if out_len % EB_SIZE_PAGE != 0 {
        let pad = EB_SIZE_PAGE - (out_len % EB_SIZE_PAGE);
        out_file
            .write_all(&vec![0u8; pad as usize])
            .map_err(|e| EbzipError::io(out_catalog_name, e))?;
    }

    // The original writes `subbook_name_count` here when a filter was
    // given, which overcounts the header whenever a requested name failed
    // to match any subbook. This crate writes the count actually retained
    // instead (see DESIGN.md).
    let final_count = if subbook_names.is_empty() { in_subbook_count } else { retained };
    let mut count_bytes = [0u8; 2];
    count_bytes[0] = ((final_count >> 8) & 0xff) as u8;
    count_bytes[1] = (final_count & 0xff) as u8;
    out_file.seek(SeekFrom::Start(0)).map_err(|e| EbzipError::io(out_catalog_name, e))?;
    out_file.write_all(&count_bytes).map_err(|e| EbzipError::io(out_catalog_name, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eb_record(name: &str) -> Vec<u8> {
        let mut record = vec![0u8; catalog::EB_SIZE_EB_CATALOG];
        let start = 2 + catalog::EB_MAX_EB_TITLE_LENGTH;
        record[start..start + name.len()].copy_from_slice(name.as_bytes());
        record
    }

    fn write_eb_catalog(dir: &Path, names: &[&str]) {
        let mut bytes = vec![0u8; CATALOG_HEADER_LEN];
        bytes[1] = names.len() as u8;
        for name in names {
            bytes.extend(eb_record(name));
        }
        std::fs::write(dir.join("CATALOG"), &bytes).unwrap();
    }

    #[test]
    fn drops_unmatched_subbooks_and_fixes_count() {
        let dir = tempfile::tempdir().unwrap();
        write_eb_catalog(dir.path(), &["dict1", "dict2", "dict3"]);

        let out_dir = tempfile::tempdir().unwrap();
        refile(dir.path(), out_dir.path(), &["dict2".to_string()]).unwrap();

        let written = std::fs::read(out_dir.path().join("CATALOG")).unwrap();
        let count = ((written[0] as usize) << 8) | written[1] as usize;
        assert_eq!(count, 1);

        let record_start = CATALOG_HEADER_LEN;
        let name = catalog::directory_name_from_record(
            &written[record_start..record_start + catalog::EB_SIZE_EB_CATALOG],
            DiscKind::Eb,
        );
        assert_eq!(name, "dict2");
    }

    #[test]
    fn empty_filter_keeps_every_subbook() {
        let dir = tempfile::tempdir().unwrap();
        write_eb_catalog(dir.path(), &["dict1", "dict2"]);

        let out_dir = tempfile::tempdir().unwrap();
        refile(dir.path(), out_dir.path(), &[]).unwrap();

        let written = std::fs::read(out_dir.path().join("CATALOG")).unwrap();
        let count = ((written[0] as usize) << 8) | written[1] as usize;
        assert_eq!(count, 2);
    }

    #[test]
    fn backs_up_existing_output_once() {
        let dir = tempfile::tempdir().unwrap();
        write_eb_catalog(dir.path(), &["dict1"]);

        let out_dir = tempfile::tempdir().unwrap();
        std::fs::write(out_dir.path().join("CATALOG"), b"stale").unwrap();

        refile(dir.path(), out_dir.path(), &[]).unwrap();

        let backup = std::fs::read(out_dir.path().join("CATALOG.old")).unwrap();
        assert_eq!(backup, b"stale");
    }
}
