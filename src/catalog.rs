//! # Catalog data model
//!
//! The narrow byte-level reading of `CATALOG`/`CATALOGS` this crate needs
//! to drive the book walker and `ebrefile`, grounded on the record layout
//! read directly in `ebrefile.c`'s `refile_catalog()`. This is not a
//! reimplementation of the historical `libeb` - it only recovers
//! `directory_name`, `index_page`, and enough structure to compose member
//! file paths (§6.4).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{EbzipError, EbzipResult};

pub const EB_MAX_EB_TITLE_LENGTH: usize = 30;
pub const EB_MAX_EPWING_TITLE_LENGTH: usize = 80;
pub const EB_MAX_DIRECTORY_NAME_LENGTH: usize = 8;
pub const EB_SIZE_EB_CATALOG: usize = 2 + EB_MAX_EB_TITLE_LENGTH + EB_MAX_DIRECTORY_NAME_LENGTH;
pub const EB_SIZE_EPWING_CATALOG: usize = 2 + EB_MAX_EPWING_TITLE_LENGTH + EB_MAX_DIRECTORY_NAME_LENGTH;
pub const EB_SIZE_PAGE: u64 = 2048;
pub const CATALOG_HEADER_LEN: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiscKind {
    Eb,
    Epwing,
}

impl DiscKind {
    pub fn catalog_file_name(self) -> &'static str {
        match self {
            DiscKind::Eb => "CATALOG",
            DiscKind::Epwing => "CATALOGS",
        }
    }

    fn title_length(self) -> usize {
        match self {
            DiscKind::Eb => EB_MAX_EB_TITLE_LENGTH,
            DiscKind::Epwing => EB_MAX_EPWING_TITLE_LENGTH,
        }
    }

    pub fn record_size(self) -> usize {
        match self {
            DiscKind::Eb => EB_SIZE_EB_CATALOG,
            DiscKind::Epwing => EB_SIZE_EPWING_CATALOG,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Font {
    pub file_name: String,
}

#[derive(Clone, Debug)]
pub struct Subbook {
    pub directory_name: String,
    pub index_page: u32,
    pub text_file_name: Option<String>,
    pub sound_file_name: Option<String>,
    pub graphic_file_name: Option<String>,
    pub narrow_fonts: Vec<Font>,
    pub wide_fonts: Vec<Font>,
    pub movie_directory_name: Option<String>,
}

pub struct Book {
    pub path: PathBuf,
    pub disc_kind: DiscKind,
    pub subbooks: Vec<Subbook>,
}

/// Find a directory entry matching `base` case-insensitively, tolerating
/// a trailing ISO `;1` version suffix and, like `eb_find_file_name`, the
/// `.ebz`/`.org` suffixes a member may already be wearing (a compressed
/// or previously-decompressed book directory). Returns `None` if nothing
/// matches.
pub fn find_file_name(dir: &Path, base: &str) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    let base_lower = base.to_lowercase();
    let candidates = [base_lower.clone(), format!("{base_lower}.ebz"), format!("{base_lower}.org")];
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let stripped = name.split(';').next().unwrap_or(&name);
        if candidates.contains(&stripped.to_lowercase()) {
            return Some(name.to_string());
        }
    }
    None
}

/// Strip a trailing ISO `;n` version suffix and a `.ebz`/`.org` compression
/// suffix from a name found by `find_file_name`, preserving the case of
/// whatever remains. The book walker needs this bare stem to name its own
/// output regardless of which suffix the input happened to be wearing, the
/// same way the original threads `subbook->text_file_name` (the on-disk
/// name, whatever its case) through `eb_fix_path_name_suffix` on both the
/// input and output path.
pub fn strip_member_suffixes(name: &str) -> String {
    let without_version = name.split(';').next().unwrap_or(name);
    let lower = without_version.to_lowercase();
    if lower.ends_with(".ebz") || lower.ends_with(".org") {
        without_version[..without_version.len() - 4].to_string()
    } else {
        without_version.to_string()
    }
}

pub fn directory_name_from_record(record: &[u8], disc_kind: DiscKind) -> String {
    let start = 2 + disc_kind.title_length();
    let raw = &record[start..start + EB_MAX_DIRECTORY_NAME_LENGTH];
    let end = raw.iter().position(|&b| b == 0 || b == b' ').unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

pub fn detect_disc_kind(book_root: &Path) -> EbzipResult<DiscKind> {
    if find_file_name(book_root, "CATALOGS").is_some() {
        Ok(DiscKind::Epwing)
    } else if find_file_name(book_root, "CATALOG").is_some() {
        Ok(DiscKind::Eb)
    } else {
        Err(EbzipError::BadArguments(format!(
            "{}: neither CATALOG nor CATALOGS found",
            book_root.display()
        )))
    }
}

/// Bind a book root directory: determine disc kind from which catalog
/// file is present, then parse the per-subbook directory names out of the
/// catalog records. Member file names (text/sound/graphic/font) are
/// resolved lazily against each subbook's own directory listing by the
/// book walker, since they depend on disc kind and on-disk naming that
/// varies per subbook layout (§4.6).
pub fn bind(book_root: &Path) -> EbzipResult<Book> {
    let disc_kind = detect_disc_kind(book_root)?;
    let catalog_name = find_file_name(book_root, disc_kind.catalog_file_name())
        .expect("detect_disc_kind already confirmed presence");
    let catalog_path = book_root.join(catalog_name);

    let mut file = File::open(&catalog_path).map_err(|e| EbzipError::io(&catalog_path, e))?;
    let mut header = [0u8; CATALOG_HEADER_LEN];
    file.read_exact(&mut header).map_err(|e| EbzipError::io(&catalog_path, e))?;
    let subbook_count = ((header[0] as usize) << 8) | header[1] as usize;

    let record_size = disc_kind.record_size();
    let mut subbooks = Vec::with_capacity(subbook_count);
    for _ in 0..subbook_count {
        let mut record = vec![0u8; record_size];
        file.read_exact(&mut record).map_err(|e| EbzipError::io(&catalog_path, e))?;
        let directory_name = directory_name_from_record(&record, disc_kind);
        subbooks.push(Subbook {
            directory_name,
            index_page: 1,
            text_file_name: None,
            sound_file_name: None,
            graphic_file_name: None,
            narrow_fonts: Vec::new(),
            wide_fonts: Vec::new(),
            movie_directory_name: None,
        });
    }

    Ok(Book { path: book_root.to_path_buf(), disc_kind, subbooks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eb_record(name: &str) -> Vec<u8> {
        let mut record = vec![0u8; EB_SIZE_EB_CATALOG];
        let start = 2 + EB_MAX_EB_TITLE_LENGTH;
        record[start..start + name.len()].copy_from_slice(name.as_bytes());
        record
    }

    #[test]
    fn parses_directory_names_from_eb_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0u8; CATALOG_HEADER_LEN];
        bytes[1] = 2;
        bytes.extend(eb_record("dict1"));
        bytes.extend(eb_record("dict2"));
        std::fs::write(dir.path().join("CATALOG"), &bytes).unwrap();

        let book = bind(dir.path()).unwrap();
        assert_eq!(book.disc_kind, DiscKind::Eb);
        assert_eq!(book.subbooks.len(), 2);
        assert_eq!(book.subbooks[0].directory_name, "dict1");
        assert_eq!(book.subbooks[1].directory_name, "dict2");
    }

    #[test]
    fn epwing_catalog_is_preferred_when_both_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CATALOG"), vec![0u8; CATALOG_HEADER_LEN]).unwrap();
        std::fs::write(dir.path().join("CATALOGS"), vec![0u8; CATALOG_HEADER_LEN]).unwrap();
        let book = bind(dir.path()).unwrap();
        assert_eq!(book.disc_kind, DiscKind::Epwing);
    }

    #[test]
    fn find_file_name_is_case_insensitive_and_strips_iso_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Honmon;1"), b"x").unwrap();
        assert_eq!(find_file_name(dir.path(), "honmon"), Some("Honmon;1".to_string()));
    }
}
