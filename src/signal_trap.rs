//! # Signal trap
//!
//! The original installs a raw handler that only performs async-signal-safe
//! operations: `close`, `unlink`, `_exit`. Rust cannot express "only call
//! async-signal-safe functions from a signal handler" directly, so per the
//! design note in §9 this is built as a self-pipe equivalent: a dedicated
//! background thread blocks on `signal_hook`'s iterator and performs the
//! cleanup itself, never touching the run's own data structures beyond the
//! trap cell.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

struct TrapState {
    file: File,
    path: PathBuf,
}

static TRAP_CELL: OnceLock<Mutex<Option<TrapState>>> = OnceLock::new();
static THREAD_STARTED: OnceLock<()> = OnceLock::new();

fn cell() -> &'static Mutex<Option<TrapState>> {
    TRAP_CELL.get_or_init(|| Mutex::new(None))
}

/// Spawn the signal-handling thread once per process. Safe to call more
/// than once; only the first call has effect.
pub fn install() {
    THREAD_STARTED.get_or_init(|| {
        let mut signals = match Signals::new([SIGHUP, SIGINT, SIGQUIT, SIGTERM]) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("could not install signal trap: {e}");
                return;
            }
        };
        std::thread::spawn(move || {
            for _signal in signals.forever() {
                let mut guard = match cell().lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                if let Some(mut trap) = guard.take() {
                    let _ = trap.file.flush();
                    drop(trap.file);
                    let _ = std::fs::remove_file(&trap.path);
                }
                std::process::exit(1);
            }
        });
    });
}

/// Register `file`/`path` as the output to clean up if a signal arrives.
/// Mirrors setting the process-global `trap_file`/`trap_file_name` cells
/// before the destructive step of `zip_file`/`unzip_file`. A duplicated
/// file descriptor is registered so the caller keeps using its own handle
/// undisturbed; the trap thread only ever touches its private clone.
pub fn arm(file: &File, path: PathBuf) -> std::io::Result<()> {
    let clone = file.try_clone()?;
    let mut guard = match cell().lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    };
    *guard = Some(TrapState { file: clone, path });
    Ok(())
}

/// Clear the trap cell on clean completion, equivalent to the original
/// restoring default signal handlers once the destructive step is done.
pub fn disarm() {
    let mut guard = match cell().lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    };
    *guard = None;
}
