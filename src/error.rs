use std::fmt;

/// Crate-wide error type. Mirrors the error kinds in spec §7: `EARG`,
/// `EIO`, `ECORRUPT`, `EEXCL`.
#[derive(Debug)]
pub enum Error {
    /// `EARG` — caller supplied invalid input.
    Arg(String),
    /// `EIO` — a filesystem operation failed.
    Io(std::io::Error),
    /// `ECORRUPT` — header magic/version mismatch or an impossible offset.
    Corrupt(&'static str),
    /// `EEXCL` — the data directory is already locked by another process.
    AlreadyLocked,
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arg(msg) => write!(f, "invalid argument: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::AlreadyLocked => write!(f, "data directory is locked by another process"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl Error {
    pub fn arg(msg: impl Into<String>) -> Self {
        Error::Arg(msg.into())
    }

    /// `true` for `EARG`, the only kind a caller can fix by changing its
    /// own request rather than retrying.
    pub fn is_arg(&self) -> bool {
        matches!(self, Error::Arg(_))
    }
}
