//! # Error taxonomy
//!
//! One closed enum covers every way a run can fail.  Warnings that do not
//! change the run's exit code (a stray `utime` failure, an unlink-at-end
//! failure, a partial subbook match in `ebrefile`) are logged directly with
//! `log::warn!` rather than modeled as error variants.

use std::path::PathBuf;

pub type EbzipResult<T> = Result<T, EbzipError>;

#[derive(thiserror::Error, Debug)]
pub enum EbzipError {
    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: not a valid container")]
    BadContainer { path: PathBuf },

    #[error("{path}: CRC error")]
    CrcMismatch { path: PathBuf },

    #[error("{path}: unexpected EOF")]
    UnexpectedEof { path: PathBuf },

    #[error("failed to allocate slice buffer")]
    MemoryExhausted,

    #[error("unknown subbook: {0}")]
    UnknownSubbook(String),

    #[error("user declined to overwrite {0}")]
    UserDeclined(PathBuf),
}

impl EbzipError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EbzipError::Io { path: path.into(), source }
    }
}
