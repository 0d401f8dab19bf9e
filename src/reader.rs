//! Sequential archive reader.
use {
    crate::{
        error::{Error, FormatError, Result},
        framer::{self, padded_len, padding_len},
        header::{self, Block, Decoded, Entry, EntryType, Extension, PaxExtension, BLOCK_SIZE},
        options::{EndMarker, ReaderOptions},
    },
    futures_lite::{
        future,
        io::AsyncRead,
        Stream,
    },
    std::{
        pin::Pin,
        task::{self, Context, Poll},
    },
};

const SKIP_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    // next read is a header block
    Header,
    // inside the data region (or its padding) of the last returned entry
    Entry,
    // end marker seen or an error was returned
    Done,
}

/// Extension records waiting for the entry they apply to.
#[derive(Default)]
struct Pending {
    long_name: Option<String>,
    long_link: Option<String>,
    pax: Vec<PaxExtension>,
}

impl Pending {
    fn apply(self, entry: &mut Entry) -> std::result::Result<(), FormatError> {
        if let Some(long_name) = self.long_name {
            entry.path = long_name;
        }
        if let Some(long_link) = self.long_link {
            entry.link_name = Some(long_link);
        }
        for pax in &self.pax {
            pax.apply(entry)?;
        }
        Ok(())
    }
}

/// Forward-only reader of archive entries from an `AsyncRead` source.
///
/// [`next_entry`](Self::next_entry) returns the metadata of each entry in
/// turn. The data of the current entry is available through
/// [`data`](Self::data), [`read_data`](Self::read_data) or
/// [`read_data_to_end`](Self::read_data_to_end); whatever is left unread is
/// skipped by the next call to `next_entry`. Once the end marker is reached or
/// an error has been returned the sequence is over and `next_entry` keeps
/// returning `None`.
pub struct ArchiveReader<R> {
    reader: R,
    options: ReaderOptions,
    state: State,
    // current position in the stream
    pos: u64,
    // unread data bytes of the current entry
    remaining: u64,
    // padding bytes after the current entry's data
    padding: u64,
    // global PAX records, applied to every later entry
    globals: Vec<PaxExtension>,
    skip_buf: Option<Box<[u8]>>,
}

impl<R: AsyncRead + Unpin> ArchiveReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ReaderOptions::default())
    }

    pub fn with_options(reader: R, options: ReaderOptions) -> Self {
        Self {
            reader,
            options,
            state: State::Header,
            pos: 0,
            remaining: 0,
            padding: 0,
            globals: Vec::new(),
            skip_buf: None,
        }
    }

    /// Skip whatever is left of the current entry and decode the next header.
    ///
    /// Returns `Ok(None)` at the end of the archive.
    pub async fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.state == State::Done {
            return Ok(None);
        }
        match self.advance().await {
            Ok(Some(entry)) => Ok(Some(entry)),
            other => {
                self.state = State::Done;
                other
            }
        }
    }

    /// `AsyncRead` over the data of the current entry.
    pub fn data(&mut self) -> EntryData<'_, R> {
        EntryData { archive: self }
    }

    /// Read data of the current entry into `buf`; `Ok(0)` at its end.
    pub async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        future::poll_fn(|cx| self.poll_read_data(cx, &mut *buf)).await
    }

    /// Read the remaining data of the current entry, consuming its padding.
    pub async fn read_data_to_end(&mut self) -> Result<Vec<u8>> {
        let capacity = std::cmp::min(self.remaining, SKIP_BUFFER_SIZE as u64) as usize;
        let mut data = Vec::with_capacity(capacity);
        let mut chunk = [0u8; BLOCK_SIZE * 16];
        loop {
            match self.read_data(&mut chunk).await? {
                0 => return Ok(data),
                n => data.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Stop reading; later calls to `next_entry` return `None`.
    pub fn close(&mut self) {
        self.state = State::Done;
    }

    /// Number of archive bytes consumed from the source so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Turn the reader into a stream of entries paired with their data.
    pub fn entries(self) -> impl Stream<Item = Result<(Entry, Vec<u8>)>> {
        futures::stream::try_unfold(self, |mut archive| async move {
            let next = match archive.next_entry().await? {
                Some(entry) => {
                    let data = archive.read_data_to_end().await?;
                    Some(((entry, data), archive))
                }
                None => None,
            };
            Ok::<_, Error>(next)
        })
    }

    pub(crate) fn poll_read_data(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        match self.poll_data(cx, buf) {
            Poll::Ready(Err(err)) => {
                self.state = State::Done;
                Poll::Ready(Err(err))
            }
            other => other,
        }
    }

    fn poll_data(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<Result<usize>> {
        loop {
            if self.state != State::Entry {
                return Poll::Ready(Ok(0));
            }
            tracing::trace!(
                target: "tar",
                "entry.poll_read: buf.len={} pos={} remaining={} padding={}",
                buf.len(),
                self.pos,
                self.remaining,
                self.padding
            );
            if self.remaining > 0 {
                if buf.is_empty() {
                    return Poll::Ready(Ok(0));
                }
                let len = std::cmp::min(self.remaining, buf.len() as u64) as usize;
                let n = task::ready!(Pin::new(&mut self.reader).poll_read(cx, &mut buf[..len]))?;
                if n == 0 {
                    return Poll::Ready(Err(FormatError::UnexpectedEof.into()));
                }
                self.remaining -= n as u64;
                self.pos += n as u64;
                return Poll::Ready(Ok(n));
            }
            if self.padding == 0 {
                self.state = State::Header;
                return Poll::Ready(Ok(0));
            }
            let mut pad = [0u8; BLOCK_SIZE];
            let len = self.padding as usize;
            let n = task::ready!(Pin::new(&mut self.reader).poll_read(cx, &mut pad[..len]))?;
            if n == 0 {
                return Poll::Ready(Err(FormatError::UnexpectedEof.into()));
            }
            self.padding -= n as u64;
            self.pos += n as u64;
        }
    }

    async fn skip_data(&mut self) -> Result<()> {
        if self.remaining > 0 {
            tracing::trace!(target: "tar", "skipping {} unread bytes", self.remaining);
        }
        let mut buf = self
            .skip_buf
            .take()
            .unwrap_or_else(|| vec![0u8; SKIP_BUFFER_SIZE].into_boxed_slice());
        while self.state == State::Entry {
            self.read_data(&mut buf).await?;
        }
        self.skip_buf = Some(buf);
        Ok(())
    }

    async fn read_block(&mut self, block: &mut Block) -> Result<usize> {
        let n = framer::read_full(&mut self.reader, block).await?;
        self.pos += n as u64;
        Ok(n)
    }

    async fn advance(&mut self) -> Result<Option<Entry>> {
        if self.state == State::Entry {
            self.skip_data().await?;
        }
        let mut pending = Pending::default();
        loop {
            let mut block = [0u8; BLOCK_SIZE];
            match self.read_block(&mut block).await? {
                BLOCK_SIZE => {}
                0 if self.options.end_marker == EndMarker::Lenient => {
                    tracing::warn!(
                        target: "tar",
                        "archive ends without an end marker at {}",
                        self.pos
                    );
                    return Ok(None);
                }
                _ => return Err(FormatError::UnexpectedEof.into()),
            }
            if block.iter().all(|b| *b == 0) {
                self.read_end_marker().await?;
                return Ok(None);
            }
            match header::decode_header(&block)? {
                Decoded::Extension { kind, size } => {
                    self.read_extension(kind, size, &mut pending).await?;
                }
                Decoded::Entry(mut entry) => {
                    for global in &self.globals {
                        global.apply(&mut entry)?;
                    }
                    pending.apply(&mut entry)?;
                    if let EntryType::Other(flag) = entry.entry_type {
                        tracing::debug!(
                            target: "tar",
                            "unknown typeflag {:#04x} for {}, read as opaque data",
                            flag,
                            entry.path
                        );
                    }
                    let data_len = entry.data_len();
                    self.remaining = data_len;
                    self.padding = padding_len(data_len);
                    self.state = State::Entry;
                    tracing::debug!(
                        target: "tar",
                        "read {} {} ({} bytes) at {}",
                        entry.entry_type,
                        entry.path,
                        data_len,
                        self.pos - BLOCK_SIZE as u64
                    );
                    return Ok(Some(entry));
                }
            }
        }
    }

    async fn read_extension(
        &mut self,
        kind: Extension,
        size: u64,
        pending: &mut Pending,
    ) -> Result<()> {
        let max = self.options.max_extension_size as u64;
        if size > max {
            return Err(FormatError::ExtensionTooLarge { size, max }.into());
        }
        let payload = framer::read_aligned(&mut self.reader, size).await?;
        self.pos += padded_len(size);
        tracing::trace!(target: "tar", "{} of {} bytes", kind, size);
        match kind {
            Extension::GnuLongName => {
                pending.long_name = Some(header::parse_long_name(&payload)?)
            }
            Extension::GnuLongLink => {
                pending.long_link = Some(header::parse_long_name(&payload)?)
            }
            Extension::PaxLocal => pending.pax.push(PaxExtension::parse(&payload)?),
            Extension::PaxGlobal => self.globals.push(PaxExtension::parse(&payload)?),
        }
        Ok(())
    }

    /// Called after a first zero block; checks the second one.
    async fn read_end_marker(&mut self) -> Result<()> {
        let mut block = [0u8; BLOCK_SIZE];
        let n = self.read_block(&mut block).await?;
        let lenient = self.options.end_marker == EndMarker::Lenient;
        match n {
            BLOCK_SIZE if block.iter().all(|b| *b == 0) => {
                tracing::trace!(target: "tar", "end marker at {}", self.pos);
                Ok(())
            }
            BLOCK_SIZE if lenient => {
                tracing::warn!(
                    target: "tar",
                    "ignoring data after a single zero block at {}",
                    self.pos
                );
                Ok(())
            }
            BLOCK_SIZE => Err(FormatError::InvalidEndMarker.into()),
            _ if lenient => {
                tracing::warn!(target: "tar", "archive terminated by a single zero block");
                Ok(())
            }
            _ => Err(FormatError::UnexpectedEof.into()),
        }
    }
}

/// Data of the entry most recently returned by
/// [`ArchiveReader::next_entry`].
///
/// Dropping it early is fine: the rest of the data is skipped by the next
/// `next_entry` call.
pub struct EntryData<'a, R> {
    archive: &'a mut ArchiveReader<R>,
}

impl<R: AsyncRead + Unpin> EntryData<'_, R> {
    /// Data bytes not read yet.
    pub fn remaining(&self) -> u64 {
        self.archive.remaining
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for EntryData<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        self.get_mut()
            .archive
            .poll_read_data(cx, buf)
            .map_err(std::io::Error::from)
    }
}
