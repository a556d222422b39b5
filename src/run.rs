//! # Run context
//!
//! Everything that is process-global for the duration of one invocation:
//! the flags parsed from the command line, the deferred unlink ledger, and
//! (module-scoped in `signal_trap`) the signal-trap cell. A `&Run` is
//! threaded through the walker and transformer the way the teacher threads
//! `&clap::ArgMatches` into its `commands::*` functions.

use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Overwrite {
    Confirm,
    Force,
    No,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SkipFlags {
    pub font: bool,
    pub graphic: bool,
    pub sound: bool,
    pub movie: bool,
}

pub struct Run {
    pub level: u8,
    pub overwrite: Overwrite,
    pub keep: bool,
    pub test: bool,
    pub quiet: bool,
    pub subbooks: Vec<String>,
    pub skip: SkipFlags,
    pub output_dir: PathBuf,
    unlink_ledger: Mutex<Vec<PathBuf>>,
}

impl Run {
    pub fn new(output_dir: PathBuf) -> Self {
        Run {
            level: 0,
            overwrite: Overwrite::Confirm,
            keep: false,
            test: false,
            quiet: false,
            subbooks: Vec::new(),
            skip: SkipFlags::default(),
            output_dir,
            unlink_ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn slice_size(&self) -> u64 {
        2048u64 << self.level
    }

    /// Append `path` to the deferred unlink ledger, skipping duplicates.
    /// Mirrors `unlink_files_add` in the original: a failure to grow the
    /// ledger is a warning, not a fatal error, and leaves the file on disk.
    pub fn schedule_unlink(&self, path: PathBuf) {
        let mut ledger = match self.unlink_ledger.lock() {
            Ok(l) => l,
            Err(_) => {
                log::warn!("unlink ledger poisoned, not registering {}", path.display());
                return;
            }
        };
        if !ledger.contains(&path) {
            ledger.push(path);
        }
    }

    /// Unlink every path registered so far, in order, warning (not failing)
    /// on individual errors. Called once at the end of a successful run,
    /// unless `--keep` or `--test` was given.
    pub fn commit_unlinks(&self) {
        if self.keep || self.test {
            return;
        }
        let mut ledger = match self.unlink_ledger.lock() {
            Ok(l) => l,
            Err(p) => p.into_inner(),
        };
        for path in ledger.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("failed to unlink {}: {}", path.display(), e);
            }
        }
    }
}

/// Which action an `ebzip` invocation performs; selected by flag or by
/// binary/argv[0] name, as in the original's `ebzip`/`ebunzip`/`ebzipinfo`
/// trio built from shared sources.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Action {
    Zip,
    Unzip,
    Info,
}
