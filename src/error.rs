//! Error kinds surfaced at the ingestion and facade boundaries.
//!
//! Only [`Error::Io`] escapes to the caller unmangled; every structural
//! problem with the store or a stroke file collapses to "record absent"
//! or "empty render" so a partially corrupt store stays browsable (see
//! the error handling section of the design doc).

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no record at the requested path")]
    NotFound,

    #[error("malformed or missing sidecar at {path}: {reason}")]
    BadStore { path: PathBuf, reason: String },

    #[error("unsupported or truncated stroke stream")]
    BadStrokes,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Project this error onto the negated POSIX errno the facade returns.
    ///
    /// `BadStore`/`BadStrokes` never reach this directly in practice — both
    /// are demoted to `NotFound` or an empty render well before the facade
    /// boundary — but the mapping is total so a future caller can't forget
    /// a variant.
    pub fn errno(&self) -> libc::c_int {
        match self {
            Error::NotFound => libc::ENOENT,
            Error::BadStore { .. } => libc::ENOENT,
            Error::BadStrokes => libc::ENOENT,
            Error::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}
