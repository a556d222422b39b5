//! # `ebzip`
//!
//! A sliced-deflate codec and book-traversal driver for EB/EPWING
//! CD-ROM reference-book discs.
//!
//! ## Architecture
//!
//! Bottom-up, mirroring the layering in the design notes:
//! * [`codec`] - pure in-memory slice compress/decompress plus the running
//!   Adler-32 accumulator.
//! * [`zio`] - the `Zio` container façade: opens a physical file, sniffs its
//!   kind (`PLAIN`/`EBZIP1`/`EPWING`/`SEBXA`), and serves positioned logical
//!   reads.
//! * [`sebxa`] and [`speedup`] - the two index-page readers a START/HONMON
//!   file needs: the S-EBXA compression-region probe/rewrite, and the
//!   speedup-region planner that picks which slices must be stored.
//! * [`transform`] - the three per-file operations (`zip_file`,
//!   `unzip_file`, `zipinfo_file`) plus the plain byte copy, each signal-safe
//!   and timestamp-preserving.
//! * [`catalog`] and [`book`] - the on-disk catalog reader and the walker
//!   that enumerates a book's subbooks and physical files and drives the
//!   transformer over the selected ones.
//! * [`ebrefile`] - the independent catalog byte-surgery utility.
//!
//! [`run`] holds the process-global configuration threaded through the
//! walker (`Run`), and [`signal_trap`] holds the one truly process-global
//! piece of state the OS forces: the trap cell that a background thread
//! consults to clean up a partial output file on SIGHUP/SIGINT/SIGQUIT/SIGTERM.
//! [`cli`] builds the `clap` command lines for the `ebzip` and `ebrefile`
//! binaries.

pub mod book;
pub mod catalog;
pub mod cli;
pub mod codec;
pub mod ebrefile;
pub mod error;
pub mod run;
pub mod sebxa;
pub mod signal_trap;
pub mod speedup;
pub mod transform;
pub mod zio;

use std::path::Path;

use error::EbzipResult;
use run::{Action, Run};

/// Compress every selected physical file of the book at `book_dir`.
pub fn run_zip(book_dir: &Path, run: &Run) -> EbzipResult<()> {
    signal_trap::install();
    book::walk_book(book_dir, Action::Zip, run)
}

/// Decompress every selected physical file of the book at `book_dir`.
pub fn run_unzip(book_dir: &Path, run: &Run) -> EbzipResult<()> {
    signal_trap::install();
    book::walk_book(book_dir, Action::Unzip, run)
}

/// Print a one-line summary per selected physical file; modifies nothing.
pub fn run_info(book_dir: &Path, run: &Run) -> EbzipResult<()> {
    book::walk_book(book_dir, Action::Info, run)
}

/// Rewrite `book_dir`'s catalog file, keeping only the named subbooks (or
/// all of them if `subbooks` is empty), writing the result under `output_dir`.
pub fn run_refile(book_dir: &Path, output_dir: &Path, subbooks: &[String]) -> EbzipResult<()> {
    ebrefile::refile(book_dir, output_dir, subbooks)
}
