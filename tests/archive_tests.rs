use std::{
    fmt::Debug,
    path::PathBuf,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

use anyhow::Result;
use futures_lite::{
    io::{AsyncReadExt, AsyncWrite, Cursor},
    StreamExt,
};
use targen::{
    checksum, encode, ArchiveReader, ArchiveWriter, Block, EndMarker, Entry, EntryType,
    FormatError, LongNames, ReaderOptions, WriterOptions, BLOCK_SIZE,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

async fn read_fixture(name: &str) -> Result<Vec<(Entry, Vec<u8>)>> {
    let archive = smol::fs::File::open(fixture(name)).await?;
    let mut reader = ArchiveReader::new(archive);
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let data = reader.read_data_to_end().await?;
        out.push((entry, data));
    }
    Ok(out)
}

/// Contents shared by the `gnu.tar` and `pax.tar` fixtures, both created by
/// GNU tar 1.34 with `--mtime=2024-01-01 --owner=0 --group=0 --numeric-owner
/// --sort=name`.
fn check_long_name_fixture(entries: &[(Entry, Vec<u8>)]) {
    let long_file = format!("long/{}", "w".repeat(120));
    let paths = entries.iter().map(|(e, _)| e.path.as_str()).collect::<Vec<_>>();
    assert_eq!(
        paths,
        [
            "dir/",
            "dir/empty",
            "dir/hello.txt",
            "dir/sub/",
            "dir/sub/thousand.bin",
            "long/",
            "long/link",
            long_file.as_str(),
        ]
    );
    for (entry, data) in entries {
        assert_eq!(entry.mtime, 1_704_067_200, "{}", entry.path);
        assert_eq!((entry.uid, entry.gid), (0, 0));
        let mode = match entry.entry_type {
            EntryType::Directory => 0o755,
            EntryType::Symlink => 0o777,
            _ => 0o644,
        };
        assert_eq!(entry.mode, mode, "{}", entry.path);
        assert_eq!(data.len() as u64, entry.data_len());
    }
    assert_eq!(entries[2].1, b"hello tar\n");
    assert_eq!(entries[4].1, vec![b'x'; 1000]);
    assert_eq!(entries[6].0.entry_type, EntryType::Symlink);
    assert_eq!(
        entries[6].0.link_name.as_deref(),
        Some(format!("../{}", long_file).as_str())
    );
    assert_eq!(entries[7].0.size, 15);
    assert_eq!(entries[7].1, b"long name data\n");
}

/// Sink that fails every write once `limit` bytes have been accepted.
struct FailingSink {
    written: Vec<u8>,
    limit: usize,
}

impl AsyncWrite for FailingSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let room = self.limit - self.written.len();
        if room == 0 {
            return Poll::Ready(Err(std::io::Error::other("disk full")));
        }
        let n = buf.len().min(room);
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn format_error<T: Debug>(res: targen::Result<T>) -> FormatError {
    match res {
        Err(err) => err
            .format()
            .cloned()
            .unwrap_or_else(|| panic!("expected a format error, got {:?}", err)),
        Ok(v) => panic!("expected a format error, got {:?}", v),
    }
}

/// Header block of an extension record with the given typeflag.
fn raw_extension_header(typeflag: u8, size: u64) -> Block {
    let mut block = encode(&Entry::file("././@PaxHeader", size)).unwrap();
    block[156] = typeflag;
    let sum = checksum(&block);
    block[148..156].copy_from_slice(format!("{:06o}\0 ", sum).as_bytes());
    block
}

fn padded(payload: &[u8]) -> Vec<u8> {
    let mut out = payload.to_vec();
    out.resize(targen::framer::padded_len(payload.len() as u64) as usize, 0);
    out
}

async fn write_archive(entries: &[(Entry, Vec<u8>)], options: WriterOptions) -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::with_options(Cursor::new(Vec::new()), options);
    for (entry, data) in entries {
        writer.add_entry(entry, Cursor::new(data)).await?;
    }
    writer.close().await?;
    Ok(writer.into_inner().into_inner())
}

async fn read_archive(bytes: &[u8], options: ReaderOptions) -> Result<Vec<(Entry, Vec<u8>)>> {
    let mut reader = ArchiveReader::with_options(Cursor::new(bytes), options);
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let data = reader.read_data_to_end().await?;
        out.push((entry, data));
    }
    Ok(out)
}

fn sample_entries() -> Vec<(Entry, Vec<u8>)> {
    let file = |path: &str, len: usize| {
        let data = (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        (
            Entry::file(path, len as u64)
                .with_mode(0o640)
                .with_mtime(1_600_000_000 + len as u64)
                .with_owner(1000, 1001)
                .with_owner_names("alice", "staff"),
            data,
        )
    };
    vec![
        (Entry::directory("root/").with_mtime(1), Vec::new()),
        file("root/empty", 0),
        file("root/one", 1),
        file("root/block", 511),
        file("root/exact", 512),
        file("root/over", 513),
        file("root/big", 70_000),
        (Entry::symlink("root/link", "one"), Vec::new()),
        (Entry::hard_link("root/hard", "root/one"), Vec::new()),
        (Entry::char_device("root/null", 1, 3), Vec::new()),
        (Entry::block_device("root/sda", 8, 0), Vec::new()),
        (Entry::fifo("root/pipe"), Vec::new()),
    ]
}

struct SharedSink {
    inner: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicUsize>,
}

impl AsyncWrite for SharedSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.inner.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

#[test]
fn single_small_file() -> Result<()> {
    smol::block_on(async {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        writer
            .add_entry(&Entry::file("a.txt", 5), Cursor::new(b"hello"))
            .await?;
        writer.close().await?;
        assert_eq!(writer.position(), 2048);
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.len(), 2048);
        assert_eq!(&bytes[512..517], b"hello");
        assert!(bytes[517..].iter().all(|b| *b == 0));

        let mut reader = ArchiveReader::new(Cursor::new(&bytes));
        let entry = reader.next_entry().await?.expect("one entry");
        assert_eq!(entry.path, "a.txt");
        assert_eq!(entry.entry_type, EntryType::Regular);
        assert_eq!(entry.size, 5);
        let mut data = Vec::new();
        reader.data().read_to_end(&mut data).await?;
        assert_eq!(data, b"hello");
        assert!(reader.next_entry().await?.is_none());
        assert!(reader.next_entry().await?.is_none());
        assert_eq!(reader.position(), 2048);
        Ok(())
    })
}

#[test]
fn round_trip_preserves_order_metadata_and_data() -> Result<()> {
    smol::block_on(async {
        let entries = sample_entries();
        let bytes = write_archive(&entries, WriterOptions::default()).await?;
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);
        let read = read_archive(&bytes, ReaderOptions::default()).await?;
        assert_eq!(read.len(), entries.len());
        for ((written, data), (entry, read_data)) in entries.iter().zip(read.iter()) {
            assert_eq!(written, entry);
            assert_eq!(data, read_data, "data of {}", entry.path);
        }
        Ok(())
    })
}

#[test]
fn entries_stream_yields_every_entry() -> Result<()> {
    smol::block_on(async {
        let entries = sample_entries();
        let bytes = write_archive(&entries, WriterOptions::default()).await?;
        let reader = ArchiveReader::new(Cursor::new(bytes));
        let read: Vec<(Entry, Vec<u8>)> = Box::pin(reader.entries()).try_collect().await?;
        assert_eq!(read, entries);
        Ok(())
    })
}

#[test]
fn partially_read_data_is_skipped() -> Result<()> {
    smol::block_on(async {
        let entries = vec![
            (Entry::file("first", 1500), vec![1u8; 1500]),
            (Entry::file("second", 6), b"second".to_vec()),
        ];
        let bytes = write_archive(&entries, WriterOptions::default()).await?;
        let mut reader = ArchiveReader::new(Cursor::new(bytes));
        reader.next_entry().await?;
        let mut buf = [0u8; 3];
        assert_eq!(reader.read_data(&mut buf).await?, 3);
        assert_eq!(reader.data().remaining(), 1497);
        let second = reader.next_entry().await?.expect("second entry");
        assert_eq!(second.path, "second");
        assert_eq!(reader.read_data_to_end().await?, b"second");
        assert!(reader.next_entry().await?.is_none());
        Ok(())
    })
}

#[test]
fn truncated_archives_fail_with_unexpected_eof() -> Result<()> {
    smol::block_on(async {
        let entries = vec![(Entry::file("a.txt", 5), b"hello".to_vec())];
        let bytes = write_archive(&entries, WriterOptions::default()).await?;

        // mid-header
        for options in [
            ReaderOptions::default(),
            ReaderOptions::default().end_marker(EndMarker::Lenient),
        ] {
            let mut reader = ArchiveReader::with_options(Cursor::new(&bytes[..300]), options);
            assert_eq!(
                format_error(reader.next_entry().await),
                FormatError::UnexpectedEof
            );
            assert!(reader.next_entry().await?.is_none());
        }

        // mid-data
        let mut reader = ArchiveReader::new(Cursor::new(&bytes[..515]));
        assert!(reader.next_entry().await?.is_some());
        assert_eq!(
            format_error(reader.read_data_to_end().await),
            FormatError::UnexpectedEof
        );
        assert!(reader.next_entry().await?.is_none());

        // data complete, padding missing, skipped by next_entry
        let mut reader = ArchiveReader::new(Cursor::new(&bytes[..517]));
        assert!(reader.next_entry().await?.is_some());
        assert_eq!(
            format_error(reader.next_entry().await),
            FormatError::UnexpectedEof
        );
        Ok(())
    })
}

#[test]
fn corrupted_header_fails_with_checksum_mismatch() -> Result<()> {
    smol::block_on(async {
        let entries = vec![
            (Entry::file("a", 1), b"a".to_vec()),
            (Entry::file("b", 1), b"b".to_vec()),
        ];
        let mut bytes = write_archive(&entries, WriterOptions::default()).await?;
        bytes[1024 + 110] ^= 0x01;
        let mut reader = ArchiveReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_entry().await?.map(|e| e.path), Some("a".into()));
        assert!(matches!(
            format_error(reader.next_entry().await),
            FormatError::ChecksumMismatch { .. }
        ));
        assert!(reader.next_entry().await?.is_none());
        Ok(())
    })
}

#[test]
fn size_mismatch_is_reported() -> Result<()> {
    smol::block_on(async {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        assert_eq!(
            format_error(
                writer
                    .add_entry(&Entry::file("short", 10), Cursor::new(b"1234"))
                    .await
            ),
            FormatError::SizeMismatch {
                expected: 10,
                actual: 4
            }
        );
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        assert_eq!(
            format_error(
                writer
                    .add_entry(&Entry::file("long", 10), Cursor::new(b"123456789012"))
                    .await
            ),
            FormatError::SizeMismatch {
                expected: 10,
                actual: 12
            }
        );

        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        assert_eq!(
            format_error(writer.add_bytes(&Entry::file("x", 3), b"ab").await),
            FormatError::SizeMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(writer.position(), 0);
        assert!(writer.get_ref().get_ref().is_empty());
        Ok(())
    })
}

#[test]
fn closed_writer_rejects_entries() -> Result<()> {
    smol::block_on(async {
        let inner = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicUsize::new(0));
        let mut writer = ArchiveWriter::new(SharedSink {
            inner: inner.clone(),
            closed: closed.clone(),
        });
        writer
            .add_bytes(&Entry::directory("d/"), &[])
            .await?;
        writer.close().await?;
        writer.close().await?;
        assert!(writer.is_closed());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(inner.lock().unwrap().len(), BLOCK_SIZE * 3);

        assert_eq!(
            format_error(writer.add_bytes(&Entry::file("late", 0), &[]).await),
            FormatError::ArchiveClosed
        );
        assert_eq!(
            format_error(writer.add_entry(&Entry::file("late", 0), Cursor::new(b"")).await),
            FormatError::ArchiveClosed
        );
        assert_eq!(format_error(writer.flush().await), FormatError::ArchiveClosed);
        assert_eq!(inner.lock().unwrap().len(), BLOCK_SIZE * 3);
        Ok(())
    })
}

#[test]
fn long_names_are_rejected_by_default() -> Result<()> {
    smol::block_on(async {
        let path = format!("{}/file.txt", "d".repeat(290));
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        assert!(matches!(
            format_error(writer.add_bytes(&Entry::file(path, 0), &[]).await),
            FormatError::NameTooLong { .. }
        ));
        assert!(matches!(
            format_error(
                writer
                    .add_bytes(&Entry::symlink("link", "t".repeat(101)), &[])
                    .await
            ),
            FormatError::NameTooLong { .. }
        ));
        assert_eq!(writer.position(), 0);
        Ok(())
    })
}

#[test]
fn prefix_split_needs_no_extension() -> Result<()> {
    smol::block_on(async {
        let path = format!("{}/{}", "p".repeat(150), "n".repeat(90));
        let entries = vec![(Entry::file(path.clone(), 2), b"ok".to_vec())];
        let bytes = write_archive(&entries, WriterOptions::default()).await?;
        assert_eq!(bytes.len(), BLOCK_SIZE * 4);
        let read = read_archive(&bytes, ReaderOptions::default()).await?;
        assert_eq!(read[0].0.path, path);
        Ok(())
    })
}

async fn long_name_round_trip(mode: LongNames) -> Result<Vec<u8>> {
    let long_path = format!("{}{}.txt", "deep/".repeat(40), "c".repeat(120));
    let long_link = format!("target-{}", "t".repeat(150));
    let entries = vec![
        (Entry::file(long_path.clone(), 9), b"long data".to_vec()),
        (Entry::symlink("short-link", long_link.clone()), Vec::new()),
        (Entry::hard_link(long_path.clone(), long_link), Vec::new()),
        (Entry::file("after", 1), b"!".to_vec()),
    ];
    let bytes = write_archive(&entries, WriterOptions::default().long_names(mode)).await?;
    let read = read_archive(&bytes, ReaderOptions::default()).await?;
    assert_eq!(read, entries);
    Ok(bytes)
}

#[test]
fn pax_long_names_round_trip() -> Result<()> {
    smol::block_on(async {
        let bytes = long_name_round_trip(LongNames::Pax).await?;
        assert_eq!(bytes[156], b'x');
        assert_eq!(&bytes[..14], b"././@PaxHeader");
        Ok(())
    })
}

#[test]
fn gnu_long_names_round_trip() -> Result<()> {
    smol::block_on(async {
        let bytes = long_name_round_trip(LongNames::Gnu).await?;
        assert_eq!(bytes[156], b'L');
        assert_eq!(&bytes[..13], b"././@LongLink");
        assert_eq!(&bytes[257..265], b"ustar  \0");
        Ok(())
    })
}

fn archive_with_single_zero_block(trailer: &[u8]) -> Vec<u8> {
    let mut bytes = encode(&Entry::directory("d/")).unwrap().to_vec();
    bytes.extend_from_slice(&[0u8; BLOCK_SIZE]);
    bytes.extend_from_slice(trailer);
    bytes
}

#[test]
fn strict_end_marker_requires_two_zero_blocks() -> Result<()> {
    smol::block_on(async {
        let garbage = [0x55u8; BLOCK_SIZE];
        let cases: [(&[u8], FormatError); 2] = [
            (&garbage, FormatError::InvalidEndMarker),
            (&[], FormatError::UnexpectedEof),
        ];
        for (trailer, expected) in cases {
            let bytes = archive_with_single_zero_block(trailer);
            let mut reader = ArchiveReader::new(Cursor::new(bytes));
            assert_eq!(reader.next_entry().await?.map(|e| e.path), Some("d/".into()));
            assert_eq!(format_error(reader.next_entry().await), expected);
        }

        let bytes = encode(&Entry::directory("d/")).unwrap().to_vec();
        let mut reader = ArchiveReader::new(Cursor::new(bytes));
        reader.next_entry().await?;
        assert_eq!(
            format_error(reader.next_entry().await),
            FormatError::UnexpectedEof
        );
        Ok(())
    })
}

#[test]
fn lenient_end_marker_accepts_single_zero_block() -> Result<()> {
    smol::block_on(async {
        let options = ReaderOptions::default().end_marker(EndMarker::Lenient);
        for trailer in [&[0x55u8; BLOCK_SIZE][..], &[]] {
            let bytes = archive_with_single_zero_block(trailer);
            let read = read_archive(&bytes, options.clone()).await?;
            assert_eq!(read.len(), 1);
        }
        let bytes = encode(&Entry::directory("d/")).unwrap().to_vec();
        assert_eq!(read_archive(&bytes, options).await?.len(), 1);
        Ok(())
    })
}

#[test]
fn global_pax_records_apply_to_later_entries() -> Result<()> {
    smol::block_on(async {
        let global = b"17 uname=builder\n20 mtime=1700000000\n";
        let local = b"14 uid=424242\n";
        let options = WriterOptions::default();
        let one = write_archive(&[(Entry::file("one", 1), b"1".to_vec())], options.clone()).await?;
        let two = write_archive(&[(Entry::file("two", 1), b"2".to_vec())], options).await?;

        let mut bytes = raw_extension_header(b'g', global.len() as u64).to_vec();
        bytes.extend_from_slice(&padded(global));
        // "one" without its end marker
        bytes.extend_from_slice(&one[..BLOCK_SIZE * 2]);
        bytes.extend_from_slice(&raw_extension_header(b'x', local.len() as u64));
        bytes.extend_from_slice(&padded(local));
        bytes.extend_from_slice(&two);

        let read = read_archive(&bytes, ReaderOptions::default()).await?;
        let summary = read
            .iter()
            .map(|(e, data)| (e.path.as_str(), e.uname.as_str(), e.mtime, e.uid, data.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("one", "builder", 1_700_000_000, 0, b"1".to_vec()),
                ("two", "builder", 1_700_000_000, 424242, b"2".to_vec()),
            ]
        );
        Ok(())
    })
}

#[test]
fn oversized_extension_is_refused() -> Result<()> {
    smol::block_on(async {
        let bytes = raw_extension_header(b'x', 4 << 20).to_vec();
        let mut reader = ArchiveReader::new(Cursor::new(bytes));
        assert_eq!(
            format_error(reader.next_entry().await),
            FormatError::ExtensionTooLarge {
                size: 4 << 20,
                max: targen::DEFAULT_MAX_EXTENSION_SIZE as u64
            }
        );

        let payload = b"9 uid=77\n";
        let mut bytes = raw_extension_header(b'x', payload.len() as u64).to_vec();
        bytes.extend_from_slice(&padded(payload));
        let options = ReaderOptions::default().max_extension_size(4);
        let mut reader = ArchiveReader::with_options(Cursor::new(bytes), options);
        assert!(matches!(
            format_error(reader.next_entry().await),
            FormatError::ExtensionTooLarge { size: 9, max: 4 }
        ));
        Ok(())
    })
}

#[test]
fn closed_reader_returns_no_entries() -> Result<()> {
    smol::block_on(async {
        let bytes = write_archive(&sample_entries(), WriterOptions::default()).await?;
        let mut reader = ArchiveReader::new(Cursor::new(bytes));
        assert!(reader.next_entry().await?.is_some());
        reader.close();
        reader.close();
        assert!(reader.next_entry().await?.is_none());
        assert_eq!(reader.read_data_to_end().await?, Vec::<u8>::new());
        Ok(())
    })
}

#[test]
fn writer_is_unusable_after_a_short_source() -> Result<()> {
    smol::block_on(async {
        let inner = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicUsize::new(0));
        let mut writer = ArchiveWriter::new(SharedSink {
            inner: inner.clone(),
            closed: closed.clone(),
        });
        assert_eq!(
            format_error(
                writer
                    .add_entry(&Entry::file("short", 10), Cursor::new(b"1234"))
                    .await
            ),
            FormatError::SizeMismatch {
                expected: 10,
                actual: 4
            }
        );
        assert!(writer.is_failed());
        let written = inner.lock().unwrap().len();
        assert_eq!(written, BLOCK_SIZE + 4);

        assert_eq!(
            format_error(writer.add_bytes(&Entry::file("next", 3), b"abc").await),
            FormatError::WriterFailed
        );
        assert_eq!(format_error(writer.flush().await), FormatError::WriterFailed);
        assert_eq!(format_error(writer.close().await), FormatError::WriterFailed);
        assert_eq!(format_error(writer.close().await), FormatError::WriterFailed);
        assert!(!writer.is_closed());
        assert_eq!(inner.lock().unwrap().len(), written);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        Ok(())
    })
}

#[test]
fn failed_end_marker_does_not_close_the_writer() -> Result<()> {
    smol::block_on(async {
        let mut writer = ArchiveWriter::new(FailingSink {
            written: Vec::new(),
            limit: BLOCK_SIZE * 2,
        });
        writer.add_bytes(&Entry::directory("d/"), &[]).await?;
        let err = writer.close().await.unwrap_err();
        assert!(!err.is_format(), "{:?}", err);
        assert!(!writer.is_closed());
        assert!(writer.is_failed());
        assert_eq!(format_error(writer.close().await), FormatError::WriterFailed);
        assert_eq!(writer.get_ref().written.len(), BLOCK_SIZE * 2);
        Ok(())
    })
}

#[test]
fn size_of_entries_without_data_is_rejected_before_writing() -> Result<()> {
    smol::block_on(async {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        let dir = Entry {
            size: 5,
            ..Entry::directory("d/")
        };
        assert_eq!(
            format_error(writer.add_bytes(&dir, &[]).await),
            FormatError::SizeMismatch {
                expected: 0,
                actual: 5
            }
        );
        assert_eq!(
            format_error(writer.add_entry(&dir, Cursor::new(b"12345")).await),
            FormatError::SizeMismatch {
                expected: 0,
                actual: 5
            }
        );
        assert_eq!(writer.position(), 0);
        assert!(!writer.is_failed());

        writer.add_bytes(&Entry::directory("d/"), &[]).await?;
        writer.close().await?;
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.len(), BLOCK_SIZE * 3);
        assert_eq!(&bytes[124..136], b"00000000000\0");
        Ok(())
    })
}

#[test]
fn read_gnu_tar_archive() -> Result<()> {
    smol::block_on(async {
        let entries = read_fixture("gnu.tar").await?;
        check_long_name_fixture(&entries);
        Ok(())
    })
}

#[test]
fn read_pax_tar_archive() -> Result<()> {
    smol::block_on(async {
        let entries = read_fixture("pax.tar").await?;
        check_long_name_fixture(&entries);
        Ok(())
    })
}

#[test]
fn read_ustar_archive_with_prefix() -> Result<()> {
    smol::block_on(async {
        let entries = read_fixture("ustar.tar").await?;
        let dir = "d".repeat(60);
        let file = format!("{}/{}.txt", dir, "n".repeat(70));
        let (last, data) = entries.last().expect("entries");
        assert_eq!(entries.len(), 7);
        assert_eq!(entries[5].0.path, format!("{}/", dir));
        assert_eq!(entries[5].0.entry_type, EntryType::Directory);
        assert_eq!(last.path, file);
        assert_eq!(data, b"split name data\n");
        Ok(())
    })
}

#[test]
fn read_gnu_volume_label() -> Result<()> {
    smol::block_on(async {
        let entries = read_fixture("label.tar").await?;
        assert_eq!(entries.len(), 2);
        let (label, data) = &entries[0];
        assert_eq!(label.entry_type, EntryType::Other(b'V'));
        assert_eq!(label.path, "MYLABEL");
        assert!(data.is_empty());
        assert_eq!(entries[1].0.path, "dir/hello.txt");
        assert_eq!(entries[1].1, b"hello tar\n");
        Ok(())
    })
}

#[test]
fn unknown_entry_types_round_trip_with_data() -> Result<()> {
    smol::block_on(async {
        let entries = vec![
            (
                Entry {
                    entry_type: EntryType::Other(b'S'),
                    ..Entry::file("sparse", 600)
                },
                vec![7u8; 600],
            ),
            (Entry::file("after", 2), b"ok".to_vec()),
        ];
        let bytes = write_archive(&entries, WriterOptions::default()).await?;
        assert_eq!(bytes[156], b'S');
        assert_eq!(read_archive(&bytes, ReaderOptions::default()).await?, entries);
        Ok(())
    })
}
