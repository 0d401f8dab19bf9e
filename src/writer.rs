//! Sequential archive writer.
use {
    crate::{
        error::{FormatError, Result},
        framer::{self, padded_len},
        header::{self, Entry, Extension, BLOCK_SIZE},
        options::{LongNames, WriterOptions},
    },
    futures_lite::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    std::pin::pin,
};

const COPY_BUFFER_SIZE: usize = BLOCK_SIZE * 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    // a write failed part way, the sink holds an incomplete entry
    Failed,
    Closed,
}

/// Appends entries to an archive written to an `AsyncWrite` sink.
///
/// Entries are written strictly in the order they are added, each one
/// completely (header, data, padding) before the next begins. An error after
/// the first byte of an entry reached the sink leaves the writer failed: the
/// sink keeps what was written, there is no rollback, and every later call
/// returns [`FormatError::WriterFailed`].
pub struct ArchiveWriter<W> {
    // the underlying writer
    writer: W,
    options: WriterOptions,
    // staging buffer for entry data
    buf: Box<[u8]>,
    // number of bytes written so far
    total: u64,
    state: State,
}

impl<W: AsyncWrite + Unpin> ArchiveWriter<W> {
    /// Create a writer that targets the provided `AsyncWrite`.
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, WriterOptions::default())
    }

    pub fn with_options(writer: W, options: WriterOptions) -> Self {
        Self {
            writer,
            options,
            buf: vec![0u8; COPY_BUFFER_SIZE].into_boxed_slice(),
            total: 0,
            state: State::Open,
        }
    }

    /// Write `entry` and stream its data from `data`.
    ///
    /// The source must yield exactly [`Entry::data_len`] bytes, otherwise the
    /// call fails with [`FormatError::SizeMismatch`]. For a source that is too
    /// long, `actual` only counts the first read past the declared size.
    pub async fn add_entry<R: AsyncRead>(&mut self, entry: &Entry, data: R) -> Result<()> {
        self.ensure_open()?;
        let header = self.header_records(entry)?;
        let result = self.write_entry(&header, entry, data).await;
        self.check(result)
    }

    /// Write `entry` with its data held in memory.
    ///
    /// The length is checked before anything is written.
    pub async fn add_bytes(&mut self, entry: &Entry, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let expected = entry.data_len();
        if data.len() as u64 != expected {
            return Err(FormatError::SizeMismatch {
                expected,
                actual: data.len() as u64,
            }
            .into());
        }
        let header = self.header_records(entry)?;
        let result = self.write_bytes(&header, entry, data).await;
        self.check(result)
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.writer.flush().await.map_err(Into::into);
        self.check(result)
    }

    /// Write the end marker, then flush and close the sink.
    ///
    /// Closing an already closed writer does nothing. A failed writer is not
    /// terminated and keeps returning [`FormatError::WriterFailed`].
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            State::Closed => return Ok(()),
            State::Failed => return Err(FormatError::WriterFailed.into()),
            State::Open => {}
        }
        let result = self.finish().await;
        self.check(result)?;
        self.state = State::Closed;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Whether an earlier error left an incomplete entry in the sink.
    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// Number of archive bytes handed to the sink so far.
    pub fn position(&self) -> u64 {
        self.total
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Failed => Err(FormatError::WriterFailed.into()),
            State::Closed => Err(FormatError::ArchiveClosed.into()),
        }
    }

    fn check(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            tracing::debug!(target: "tar", "writer failed at {}: {}", self.total, err);
            self.state = State::Failed;
        }
        result
    }

    async fn write_entry<R: AsyncRead>(
        &mut self,
        header: &[u8],
        entry: &Entry,
        data: R,
    ) -> Result<()> {
        let mut data = pin!(data);
        self.writer.write_all(header).await?;
        self.total += header.len() as u64;
        let expected = entry.data_len();
        let mut remaining = expected;
        while remaining > 0 {
            let len = std::cmp::min(remaining, self.buf.len() as u64) as usize;
            let n = data.read(&mut self.buf[..len]).await?;
            if n == 0 {
                return Err(FormatError::SizeMismatch {
                    expected,
                    actual: expected - remaining,
                }
                .into());
            }
            self.writer.write_all(&self.buf[..n]).await?;
            self.total += n as u64;
            remaining -= n as u64;
        }
        let extra = data.read(&mut self.buf[..]).await?;
        if extra > 0 {
            return Err(FormatError::SizeMismatch {
                expected,
                actual: expected + extra as u64,
            }
            .into());
        }
        self.total += framer::write_padding(&mut self.writer, expected).await?;
        tracing::debug!(
            target: "tar",
            "added {} {} ({} bytes)",
            entry.entry_type,
            entry.path,
            expected
        );
        Ok(())
    }

    async fn write_bytes(&mut self, header: &[u8], entry: &Entry, data: &[u8]) -> Result<()> {
        self.writer.write_all(header).await?;
        self.total += header.len() as u64;
        framer::write_data(&mut self.writer, data).await?;
        self.total += padded_len(data.len() as u64);
        tracing::debug!(
            target: "tar",
            "added {} {} ({} bytes)",
            entry.entry_type,
            entry.path,
            data.len()
        );
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        framer::write_end_marker(&mut self.writer).await?;
        self.total += 2 * BLOCK_SIZE as u64;
        tracing::trace!(target: "tar", "end marker written, archive size = {}", self.total);
        self.writer.flush().await?;
        self.writer.close().await?;
        Ok(())
    }

    /// Encode the header block of `entry`, preceded by extension records when
    /// its names only fit that way and the options allow it. Nothing is
    /// written yet, so errors here leave the writer usable.
    fn header_records(&self, entry: &Entry) -> Result<Vec<u8>> {
        let long_names = self.options.long_names != LongNames::Reject;
        let mut records = Vec::with_capacity(BLOCK_SIZE);
        let block = match header::encode(entry) {
            Ok(block) => block,
            Err(FormatError::NameTooLong { .. }) if long_names => {
                let block = header::encode_truncated(entry)?;
                self.long_name_records(entry, &mut records)?;
                block
            }
            Err(err) => return Err(err.into()),
        };
        records.extend_from_slice(&block);
        Ok(records)
    }

    fn long_name_records(&self, entry: &Entry, records: &mut Vec<u8>) -> Result<()> {
        let long_path = header::split_path(&entry.path).is_err();
        let long_link = entry
            .link_name
            .as_deref()
            .filter(|link_name| !header::link_fits(link_name));
        tracing::trace!(
            target: "tar",
            "long names: path={} long_path={} long_link={:?}",
            entry.path,
            long_path,
            long_link
        );
        match self.options.long_names {
            LongNames::Reject => {}
            LongNames::Gnu => {
                if long_path {
                    let payload = header::long_name_payload(&entry.path);
                    extension_record(Extension::GnuLongName, &payload, records)?;
                }
                if let Some(link_name) = long_link {
                    let payload = header::long_name_payload(link_name);
                    extension_record(Extension::GnuLongLink, &payload, records)?;
                }
            }
            LongNames::Pax => {
                let mut pax = Vec::with_capacity(2);
                if long_path {
                    pax.push(("path", entry.path.as_str()));
                }
                if let Some(link_name) = long_link {
                    pax.push(("linkpath", link_name));
                }
                if !pax.is_empty() {
                    let payload = header::pax_payload(&pax);
                    extension_record(Extension::PaxLocal, &payload, records)?;
                }
            }
        }
        Ok(())
    }
}

/// Append an extension header and its padded payload to `records`.
fn extension_record(ext: Extension, payload: &[u8], records: &mut Vec<u8>) -> Result<()> {
    let block = header::encode_extension(ext, payload.len() as u64)?;
    records.extend_from_slice(&block);
    records.extend_from_slice(payload);
    records.resize(records.len() + framer::padding_len(payload.len() as u64) as usize, 0);
    tracing::trace!(target: "tar", "{}, {} bytes", ext, payload.len());
    Ok(())
}
