//! Blocking wrappers over [`ArchiveWriter`] and [`ArchiveReader`] for
//! `std::io` sinks and sources.
//!
//! Each call drives the async implementation to completion on the current
//! thread with `smol::block_on`.

use {
    crate::{
        error::{FormatError, Result},
        header::Entry,
        options::{ReaderOptions, WriterOptions},
        reader::ArchiveReader,
        writer::ArchiveWriter,
    },
    futures::io::AllowStdIo,
    std::io,
};

/// Blocking archive writer.
///
/// Dropping a writer that was not closed writes the end marker; errors at
/// that point are only logged, so call [`close`](Self::close) to see them.
/// A writer that failed part way through an entry is dropped as is.
pub struct BlockingWriter<W: io::Write> {
    inner: Option<ArchiveWriter<AllowStdIo<W>>>,
}

impl<W: io::Write> BlockingWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, WriterOptions::default())
    }

    pub fn with_options(writer: W, options: WriterOptions) -> Self {
        Self {
            inner: Some(ArchiveWriter::with_options(AllowStdIo::new(writer), options)),
        }
    }

    pub fn add_entry<R: io::Read>(&mut self, entry: &Entry, data: R) -> Result<()> {
        let archive = self.archive()?;
        smol::block_on(archive.add_entry(entry, AllowStdIo::new(data)))
    }

    pub fn add_bytes(&mut self, entry: &Entry, data: &[u8]) -> Result<()> {
        let archive = self.archive()?;
        smol::block_on(archive.add_bytes(entry, data))
    }

    pub fn flush(&mut self) -> Result<()> {
        let archive = self.archive()?;
        smol::block_on(archive.flush())
    }

    pub fn close(&mut self) -> Result<()> {
        let archive = self.archive()?;
        smol::block_on(archive.close())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.as_ref().map_or(true, ArchiveWriter::is_closed)
    }

    pub fn is_failed(&self) -> bool {
        self.inner.as_ref().is_some_and(ArchiveWriter::is_failed)
    }

    pub fn position(&self) -> u64 {
        self.inner.as_ref().map_or(0, ArchiveWriter::position)
    }

    /// Close the archive and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        let mut archive = self.inner.take().ok_or(FormatError::ArchiveClosed)?;
        smol::block_on(archive.close())?;
        Ok(archive.into_inner().into_inner())
    }

    fn archive(&mut self) -> Result<&mut ArchiveWriter<AllowStdIo<W>>> {
        self.inner
            .as_mut()
            .ok_or_else(|| FormatError::ArchiveClosed.into())
    }
}

impl<W: io::Write> Drop for BlockingWriter<W> {
    fn drop(&mut self) {
        if let Some(archive) = self.inner.as_mut().filter(|a| !a.is_failed()) {
            if let Err(err) = smol::block_on(archive.close()) {
                tracing::warn!(target: "tar", "failed to close archive on drop: {}", err);
            }
        }
    }
}

/// Blocking archive reader.
///
/// Also an [`Iterator`] over entry headers; unread data of an entry is
/// skipped when the next one is requested.
pub struct BlockingReader<R: io::Read> {
    inner: ArchiveReader<AllowStdIo<R>>,
}

impl<R: io::Read> BlockingReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ReaderOptions::default())
    }

    pub fn with_options(reader: R, options: ReaderOptions) -> Self {
        Self {
            inner: ArchiveReader::with_options(AllowStdIo::new(reader), options),
        }
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        smol::block_on(self.inner.next_entry())
    }

    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        smol::block_on(self.inner.read_data(buf))
    }

    pub fn read_data_to_end(&mut self) -> Result<Vec<u8>> {
        smol::block_on(self.inner.read_data_to_end())
    }

    /// `io::Read` over the data of the current entry.
    pub fn data(&mut self) -> BlockingEntryData<'_, R> {
        BlockingEntryData { reader: self }
    }

    pub fn close(&mut self) {
        self.inner.close()
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner().into_inner()
    }
}

impl<R: io::Read> Iterator for BlockingReader<R> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

pub struct BlockingEntryData<'a, R: io::Read> {
    reader: &'a mut BlockingReader<R>,
}

impl<R: io::Read> io::Read for BlockingEntryData<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_data(buf).map_err(io::Error::from)
    }
}
