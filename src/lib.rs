//! Streaming tar archives.
//!
//! [`ArchiveWriter`] appends entries to an `AsyncWrite` sink and
//! [`ArchiveReader`] walks the entries of an `AsyncRead` source, both one
//! 512-byte block at a time without seeking. The [`header`] module holds the
//! ustar header codec and [`framer`] the block alignment helpers. Blocking
//! wrappers for `std::io` types live in [`blocking`].

pub mod blocking;
mod error;
pub mod framer;
pub mod header;
mod options;
mod reader;
mod writer;

pub use {
    error::{Error, FormatError, Result},
    header::{checksum, decode, encode, Block, Device, Entry, EntryType, BLOCK_SIZE},
    options::{EndMarker, LongNames, ReaderOptions, WriterOptions, DEFAULT_MAX_EXTENSION_SIZE},
    reader::{ArchiveReader, EntryData},
    writer::ArchiveWriter,
};
