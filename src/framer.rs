//! Block alignment helpers.
//!
//! Every header and data region in an archive starts on a 512-byte boundary.
//! These functions write data followed by its zero padding, emit the two-block
//! end marker, and read or skip padded regions from a source.
use {
    crate::{
        error::{FormatError, Result},
        header::BLOCK_SIZE,
    },
    futures_lite::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    std::io::ErrorKind,
};

const SKIP_BUFFER_SIZE: usize = 64 * 1024;
const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// `size` rounded up to the next multiple of the block size.
pub const fn padded_len(size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        size.saturating_add(BLOCK_SIZE as u64 - 1) & !(BLOCK_SIZE as u64 - 1)
    }
}

/// Number of zero bytes that follow `size` data bytes.
pub const fn padding_len(size: u64) -> u64 {
    padded_len(size) - size
}

/// Write `bytes` and zero-pad them to the block boundary.
pub async fn write_data<W: AsyncWrite + Unpin>(sink: &mut W, bytes: &[u8]) -> Result<()> {
    sink.write_all(bytes).await?;
    write_padding(sink, bytes.len() as u64).await?;
    Ok(())
}

/// Write the padding owed after `size` data bytes; returns its length.
pub async fn write_padding<W: AsyncWrite + Unpin>(sink: &mut W, size: u64) -> Result<u64> {
    let padding = padding_len(size);
    if padding > 0 {
        sink.write_all(&ZERO_BLOCK[..padding as usize]).await?;
    }
    Ok(padding)
}

/// Write the two all-zero blocks that terminate an archive.
pub async fn write_end_marker<W: AsyncWrite + Unpin>(sink: &mut W) -> Result<()> {
    sink.write_all(&ZERO_BLOCK).await?;
    sink.write_all(&ZERO_BLOCK).await?;
    Ok(())
}

/// Read until `buf` is full or the source ends; returns the bytes read.
pub(crate) async fn read_full<R: AsyncRead + Unpin>(
    source: &mut R,
    buf: &mut [u8],
) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

/// Read `padded_len(size)` bytes and return the first `size`.
pub async fn read_aligned<R: AsyncRead + Unpin>(source: &mut R, size: u64) -> Result<Vec<u8>> {
    let padded = usize::try_from(padded_len(size)).map_err(|_| FormatError::NumericOverflow {
        field: "size",
        value: size,
    })?;
    let mut buf = vec![0u8; padded];
    if read_full(source, &mut buf).await? < padded {
        return Err(FormatError::UnexpectedEof.into());
    }
    buf.truncate(size as usize);
    Ok(buf)
}

/// Discard exactly `len` bytes.
pub async fn skip<R: AsyncRead + Unpin>(source: &mut R, len: u64) -> Result<()> {
    let mut buf = vec![0u8; std::cmp::min(len, SKIP_BUFFER_SIZE as u64) as usize];
    let mut remaining = len;
    while remaining > 0 {
        let chunk = std::cmp::min(remaining, buf.len() as u64) as usize;
        let n = read_full(source, &mut buf[..chunk]).await?;
        if n < chunk {
            return Err(FormatError::UnexpectedEof.into());
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Discard a data region of `size` bytes together with its padding.
pub async fn skip_aligned<R: AsyncRead + Unpin>(source: &mut R, size: u64) -> Result<()> {
    skip(source, padded_len(size)).await
}
