//! Writer and reader configuration.

use std::{fmt, str::FromStr};

/// PAX and GNU extension payloads larger than this are refused by default.
pub const DEFAULT_MAX_EXTENSION_SIZE: usize = 1024 * 1024;

/// How the writer stores paths and link targets that do not fit a ustar
/// header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LongNames {
    /// Fail with `NameTooLong`.
    #[default]
    Reject,
    /// Precede the entry with a PAX `x` record holding `path`/`linkpath`.
    Pax,
    /// Precede the entry with GNU `././@LongLink` records.
    Gnu,
}

impl fmt::Display for LongNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reject => "reject",
            Self::Pax => "pax",
            Self::Gnu => "gnu",
        })
    }
}

impl FromStr for LongNames {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(Self::Reject),
            "pax" => Ok(Self::Pax),
            "gnu" => Ok(Self::Gnu),
            other => Err(format!(
                "unknown long name mode {:?}, expected reject, pax or gnu",
                other
            )),
        }
    }
}

/// End-of-archive handling for the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndMarker {
    /// Require two consecutive zero blocks.
    #[default]
    Strict,
    /// Also accept a single zero block, or a stream that stops at a block
    /// boundary, logging a warning.
    Lenient,
}

#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub long_names: LongNames,
}

impl WriterOptions {
    pub fn long_names(mut self, long_names: LongNames) -> Self {
        self.long_names = long_names;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub end_marker: EndMarker,
    /// Upper bound on a single extension record payload.
    pub max_extension_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            end_marker: EndMarker::Strict,
            max_extension_size: DEFAULT_MAX_EXTENSION_SIZE,
        }
    }
}

impl ReaderOptions {
    pub fn end_marker(mut self, end_marker: EndMarker) -> Self {
        self.end_marker = end_marker;
        self
    }
    pub fn max_extension_size(mut self, size: usize) -> Self {
        self.max_extension_size = size;
        self
    }
}
