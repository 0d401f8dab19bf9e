//! Errors

/// Result wrapper
pub type Result<T> = std::result::Result<T, Error>;

/// Archive format violations.
///
/// These describe archives that are structurally wrong (or calls that would
/// produce one), as opposed to failures of the underlying byte stream.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("header checksum mismatch: stored {stored:o}, computed {computed:o}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("name of {len} bytes exceeds the {max} bytes a header can hold")]
    NameTooLong { len: usize, max: usize },

    #[error("entry declares {expected} bytes but its data source provided {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("unexpected end of archive")]
    UnexpectedEof,

    #[error("archive is closed")]
    ArchiveClosed,

    #[error("archive writer failed earlier, the archive is incomplete")]
    WriterFailed,

    #[error("invalid numeric value in `{field}` field")]
    InvalidNumeric { field: &'static str },

    #[error("value {value} does not fit in `{field}` field")]
    NumericOverflow { field: &'static str, value: u64 },

    #[error("invalid UTF-8 in `{field}` field")]
    InvalidUtf8 { field: &'static str },

    #[error("header type {0:?} is not supported")]
    UnsupportedEntryType(u8),

    #[error("unexpected data after first zero block")]
    InvalidEndMarker,

    #[error("extension header of {size} bytes exceeds {max} bytes")]
    ExtensionTooLarge { size: u64, max: u64 },

    #[error("malformed PAX extension record")]
    InvalidPaxRecord,
}

/// Crate errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("tar format error: {0}")]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The format violation behind this error, if it is one.
    pub fn format(&self) -> Option<&FormatError> {
        match self {
            Error::Format(err) => Some(err),
            Error::Io(_) => None,
        }
    }
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            Error::Format(FormatError::UnexpectedEof) => std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                FormatError::UnexpectedEof,
            ),
            Error::Format(err) => std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        }
    }
}
