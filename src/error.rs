use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    Corruption(String),
    ChecksumMismatch,
    InvalidArgument(String),
}

impl Error {
    /// Returns true for errors caused by malformed persisted bytes rather
    /// than by the environment.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption(_) | Error::ChecksumMismatch
        )
    }

    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::IoError(_))
    }
}

// io::Error is not Clone; copies keep the kind and the message.
impl Clone for Error {
    fn clone(&self) -> Self {
        let copy_io = |err: &io::Error| io::Error::new(err.kind(), err.to_string());
        match self {
            Error::IoError(err) => Error::IoError(copy_io(err)),
            Error::Corruption(msg) => Error::Corruption(msg.clone()),
            Error::ChecksumMismatch => Error::ChecksumMismatch,
            Error::InvalidArgument(msg) => Error::InvalidArgument(msg.clone()),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Corruption(msg) => write!(f, "Corruption: {}", msg),
            Error::ChecksumMismatch => write!(f, "Checksum mismatch"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
