//! # Book walker
//!
//! Enumerates a book's physical files per subbook, applies the content-kind
//! and subbook-name filters, mirrors the directory tree under the output
//! root, and dispatches each member to the file transformer. Grounded on
//! `ebzip/unzipbook.c`'s EB/EPWING split (the same structure drives
//! compression; only the transformer call and suffix direction differ).

use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::catalog::{self, Book, DiscKind};
use crate::error::{EbzipError, EbzipResult};
use crate::run::{Action, Run};
use crate::transform::{self, Outcome};
use crate::zio::{SebxaWindow, Zio, ZioKind};

const OUT_DIR_MODE: u32 = 0o777;

/// Resolve the `--subbook` filter against the book's actual directory
/// names, case-insensitively. An empty filter selects every subbook.
fn resolve_subbooks<'a>(book: &'a Book, requested: &[String]) -> EbzipResult<Vec<&'a catalog::Subbook>> {
    if requested.is_empty() {
        return Ok(book.subbooks.iter().collect());
    }
    let mut selected = Vec::with_capacity(requested.len());
    for name in requested {
        let lower = name.to_lowercase();
        match book.subbooks.iter().find(|s| s.directory_name.to_lowercase() == lower) {
            Some(sb) => selected.push(sb),
            None => return Err(EbzipError::UnknownSubbook(name.clone())),
        }
    }
    Ok(selected)
}

/// Create `path` (mode `0777 & ~umask`), unless this is a read-only pass:
/// `--test` never creates anything, and information mode (§4.3, §8.1)
/// must leave the filesystem untouched entirely.
fn mkdir_mirror(path: &Path, run: &Run, action: Action) -> EbzipResult<()> {
    if run.test || action == Action::Info {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| EbzipError::io(path, e))?;
    let mut perms = std::fs::metadata(path).map_err(|e| EbzipError::io(path, e))?.permissions();
    perms.set_mode(OUT_DIR_MODE);
    let _ = std::fs::set_permissions(path, perms);
    Ok(())
}

/// Apply the `.ebz` suffix on compress, or strip it on decompress/info.
/// `HONMON2` decompresses to `*.org` since its plain name would otherwise
/// collide with the already-suffix-stripped compressed input (§4.6).
fn member_output_name(member_name: &str, action: Action) -> String {
    match action {
        Action::Zip => format!("{member_name}.ebz"),
        Action::Unzip | Action::Info => {
            if member_name.eq_ignore_ascii_case("honmon2") {
                format!("{member_name}.org")
            } else {
                member_name.to_string()
            }
        }
    }
}

fn sniff_kind(path: &Path) -> EbzipResult<ZioKind> {
    let zio = Zio::open(path)?;
    Ok(zio.mode())
}

/// Probe whether a text member (START / HONMON) is actually an S-EBXA
/// file: the container itself is byte-identical to `PLAIN` until its
/// index page is inspected for the `0x21`/`0x22` compression-information
/// entries (§4.4). Only text members can carry this; other content kinds
/// are never probed.
fn detect_sebxa(path: &Path, index_page: u32) -> Option<SebxaWindow> {
    match crate::sebxa::get_sebxa_indexes(path, index_page) {
        Ok(window) if window.index_base != 0 || window.index_location != 0 => Some(window),
        _ => None,
    }
}

fn dispatch_member(
    input: &Path,
    output_dir: &Path,
    out_name: &str,
    index_page: u32,
    is_text: bool,
    action: Action,
    run: &Run,
    seen: &mut HashSet<PathBuf>,
) -> EbzipResult<()> {
    let canonical = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());
    if !seen.insert(canonical) {
        log::info!("{} already processed under an alias, skipping", input.display());
        return Ok(());
    }

    let mut kind = sniff_kind(input)?;
    let mut sebxa_window: Option<SebxaWindow> = None;
    if is_text && kind == ZioKind::Plain {
        if let Some(window) = detect_sebxa(input, index_page) {
            kind = ZioKind::Sebxa;
            sebxa_window = Some(window);
        }
    }

    let output = output_dir.join(member_output_name(out_name, action));
    let speedup_index_page = if is_text { Some(index_page) } else { None };
    let outcome = match action {
        Action::Zip => transform::zip_file(input, kind, &output, sebxa_window, speedup_index_page, run)?,
        Action::Unzip => {
            let outcome = transform::unzip_file(input, kind, &output, sebxa_window, run)?;
            if kind == ZioKind::Sebxa && !run.test {
                if let Err(e) = crate::sebxa::rewrite_sebxa_start(&output, index_page) {
                    log::error!("failed to rewrite S-EBXA index on {}: {}", output.display(), e);
                    return Err(e);
                }
            }
            outcome
        }
        Action::Info => {
            transform::zipinfo_file(input)?;
            Outcome::Done
        }
    };
    if let Outcome::Skipped = outcome {
        log::info!("skipped {}", input.display());
    }
    Ok(())
}

/// Run the requested action over every selected subbook of the book rooted
/// at `book_path`, honoring `run`'s subbook and content-kind filters.
pub fn walk_book(book_path: &Path, action: Action, run: &Run) -> EbzipResult<()> {
    let book = catalog::bind(book_path)?;
    let selected = resolve_subbooks(&book, &run.subbooks)?;
    let mut seen = HashSet::new();

    for subbook in &selected {
        let sub_in_dir = book_path.join(&subbook.directory_name);
        let sub_out_dir = run.output_dir.join(&subbook.directory_name);
        mkdir_mirror(&sub_out_dir, run, action)?;

        match book.disc_kind {
            DiscKind::Eb => walk_eb_subbook(&sub_in_dir, &sub_out_dir, subbook, action, run, &mut seen)?,
            DiscKind::Epwing => {
                walk_epwing_subbook(&sub_in_dir, &sub_out_dir, subbook, action, run, &mut seen)?
            }
        }
    }

    copy_catalog(&book, action, run)?;
    run.commit_unlinks();
    Ok(())
}

fn walk_eb_subbook(
    in_dir: &Path,
    out_dir: &Path,
    subbook: &catalog::Subbook,
    action: Action,
    run: &Run,
    seen: &mut HashSet<PathBuf>,
) -> EbzipResult<()> {
    if let Some(start_name) = catalog::find_file_name(in_dir, "start") {
        let input = in_dir.join(&start_name);
        let out_name = catalog::strip_member_suffixes(&start_name);
        dispatch_member(&input, out_dir, &out_name, subbook.index_page, true, action, run, seen)?;
    }
    Ok(())
}

fn walk_epwing_subbook(
    in_dir: &Path,
    out_dir: &Path,
    subbook: &catalog::Subbook,
    action: Action,
    run: &Run,
    seen: &mut HashSet<PathBuf>,
) -> EbzipResult<()> {
    let data_in = in_dir.join("data");
    let data_out = out_dir.join("data");
    mkdir_mirror(&data_out, run, action)?;

    // Text: HONMON or HONMON2.
    if let Some(honmon) = catalog::find_file_name(&data_in, "honmon") {
        let out_name = catalog::strip_member_suffixes(&honmon);
        dispatch_member(&data_in.join(&honmon), &data_out, &out_name, subbook.index_page, true, action, run, seen)?;
    } else if let Some(honmon2) = catalog::find_file_name(&data_in, "honmon2") {
        let out_name = catalog::strip_member_suffixes(&honmon2);
        dispatch_member(&data_in.join(&honmon2), &data_out, &out_name, subbook.index_page, true, action, run, seen)?;
    }

    if !run.skip.sound {
        if let Some(honmons) = catalog::find_file_name(&data_in, "honmons") {
            let out_name = catalog::strip_member_suffixes(&honmons);
            dispatch_member(&data_in.join(&honmons), &data_out, &out_name, subbook.index_page, false, action, run, seen)?;
        }
    }

    if !run.skip.graphic {
        if let Some(honmong) = catalog::find_file_name(&data_in, "honmong") {
            let out_name = catalog::strip_member_suffixes(&honmong);
            dispatch_member(&data_in.join(&honmong), &data_out, &out_name, subbook.index_page, false, action, run, seen)?;
        }
    }

    if !run.skip.font {
        let gaiji_in = in_dir.join("gaiji");
        let gaiji_out = out_dir.join("gaiji");
        if gaiji_in.is_dir() {
            mkdir_mirror(&gaiji_out, run, action)?;
            for (sub, heights) in [("narrow", [16, 24, 30, 48]), ("wide", [16, 24, 30, 48])] {
                let font_in_dir = gaiji_in.join(sub);
                let font_out_dir = gaiji_out.join(sub);
                if !font_in_dir.is_dir() {
                    continue;
                }
                mkdir_mirror(&font_out_dir, run, action)?;
                for height in heights {
                    let base = format!("font{height:02}");
                    if let Some(font_name) = catalog::find_file_name(&font_in_dir, &base) {
                        let out_name = catalog::strip_member_suffixes(&font_name);
                        dispatch_member(
                            &font_in_dir.join(&font_name),
                            &font_out_dir,
                            &out_name,
                            subbook.index_page,
                            false,
                            action,
                            run,
                            seen,
                        )?;
                    }
                }
            }
        }
    }

    if !run.skip.movie {
        let movie_in = in_dir.join("movie");
        let movie_out = out_dir.join("movie");
        if movie_in.is_dir() {
            mkdir_mirror(&movie_out, run, action)?;
            copy_directory_contents(&movie_in, &movie_out, action, run)?;
        }
    }

    Ok(())
}

/// Movie files are always byte-copied, never encoded (§4.6) - except
/// under information mode, which inspects without writing (§4.3, §8.1).
fn copy_directory_contents(in_dir: &Path, out_dir: &Path, action: Action, run: &Run) -> EbzipResult<()> {
    let entries = std::fs::read_dir(in_dir).map_err(|e| EbzipError::io(in_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EbzipError::io(in_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if action == Action::Info {
            transform::zipinfo_file(&path)?;
            continue;
        }
        let Some(name) = path.file_name() else { continue };
        let output = out_dir.join(name);
        transform::copy_file(&path, &output, run)?;
    }
    Ok(())
}

/// The catalog file is always byte-copied at book scope, never encoded
/// (§4.6) - except under information mode, which inspects without writing.
fn copy_catalog(book: &Book, action: Action, run: &Run) -> EbzipResult<()> {
    let name = book.disc_kind.catalog_file_name();
    let Some(found) = catalog::find_file_name(&book.path, name) else {
        log::warn!("catalog file {} not found, skipping copy", name);
        return Ok(());
    };
    let input = book.path.join(found);
    if action == Action::Info {
        transform::zipinfo_file(&input)?;
        return Ok(());
    }
    let output = run.output_dir.join(name);
    transform::copy_file(&input, &output, run)?;
    Ok(())
}
