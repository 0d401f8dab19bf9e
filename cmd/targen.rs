use {
    anyhow::{anyhow, Context, Result},
    clap::{Parser, Subcommand},
    futures_lite::{
        io::{AsyncRead, AsyncWrite},
        StreamExt,
    },
    smol::{fs, Unblock},
    std::{
        fs::Metadata,
        path::{Path, PathBuf},
        process::ExitCode,
    },
    targen::{
        ArchiveReader, ArchiveWriter, EndMarker, Entry, EntryType, LongNames, ReaderOptions,
        WriterOptions,
    },
    tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter},
};

type Sink = Box<dyn AsyncWrite + Unpin + Send>;
type Source = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Parser, Debug)]
#[command(name = "targen", about = "Create, list and verify tar archives")]
struct App {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Archive files and directories
    #[command(name = "create")]
    Create {
        /// Archive file, `-` for standard output
        #[arg(short = 'f', long = "file", value_name = "ARCHIVE", default_value = "-")]
        file: String,
        /// How to store names that do not fit a ustar header
        #[arg(
            short = 'l',
            long = "long-names",
            value_name = "reject|pax|gnu",
            default_value_t = LongNames::Reject
        )]
        long_names: LongNames,
        /// Files and directories to add, directories recursively
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the entries of an archive
    #[command(name = "list")]
    List {
        /// Archive file, `-` for standard input
        #[arg(short = 'f', long = "file", value_name = "ARCHIVE", default_value = "-")]
        file: String,
        /// Accept archives without a complete end marker
        #[arg(long = "lenient", action)]
        lenient: bool,
    },
    /// Read an archive to the end, checking every header and data region
    #[command(name = "verify")]
    Verify {
        /// Archive file, `-` for standard input
        #[arg(short = 'f', long = "file", value_name = "ARCHIVE", default_value = "-")]
        file: String,
        /// Accept archives without a complete end marker
        #[arg(long = "lenient", action)]
        lenient: bool,
    },
}

fn reader_options(lenient: bool) -> ReaderOptions {
    ReaderOptions::default().end_marker(if lenient {
        EndMarker::Lenient
    } else {
        EndMarker::Strict
    })
}

async fn open_sink(file: &str) -> Result<Sink> {
    if file == "-" {
        return Ok(Box::new(Unblock::new(std::io::stdout())));
    }
    let f = fs::File::create(file)
        .await
        .with_context(|| format!("failed to create {}", file))?;
    Ok(Box::new(f))
}

async fn open_source(file: &str) -> Result<Source> {
    if file == "-" {
        return Ok(Box::new(Unblock::new(std::io::stdin())));
    }
    let f = fs::File::open(file)
        .await
        .with_context(|| format!("failed to open {}", file))?;
    Ok(Box::new(f))
}

/// Name of `path` inside the archive: UTF-8, without a leading `/`.
fn archive_name(path: &Path) -> Result<String> {
    let name = path
        .to_str()
        .ok_or_else(|| anyhow!("{} is not valid UTF-8", path.display()))?
        .trim_start_matches('/');
    Ok(if name.is_empty() { "." } else { name }.to_string())
}

#[cfg(unix)]
fn with_metadata(entry: Entry, meta: &Metadata) -> Entry {
    use std::os::unix::fs::MetadataExt;
    entry
        .with_mode(meta.mode() & 0o7777)
        .with_owner(meta.uid(), meta.gid())
        .with_mtime(meta.mtime().max(0) as u64)
}

#[cfg(not(unix))]
fn with_metadata(entry: Entry, meta: &Metadata) -> Entry {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    entry.with_mtime(mtime)
}

#[cfg(unix)]
fn special_entry(name: String, meta: &Metadata) -> Option<Entry> {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};
    let file_type = meta.file_type();
    let rdev = meta.rdev();
    // glibc dev_t encoding
    let major = (((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff)) as u32;
    let minor = ((rdev & 0xff) | ((rdev >> 12) & !0xff)) as u32;
    if file_type.is_fifo() {
        Some(Entry::fifo(name))
    } else if file_type.is_char_device() {
        Some(Entry::char_device(name, major, minor))
    } else if file_type.is_block_device() {
        Some(Entry::block_device(name, major, minor))
    } else {
        None
    }
}

#[cfg(not(unix))]
fn special_entry(_name: String, _meta: &Metadata) -> Option<Entry> {
    None
}

async fn create(archive: &mut ArchiveWriter<Sink>, paths: &[PathBuf]) -> Result<()> {
    let mut stack = paths.iter().rev().cloned().collect::<Vec<_>>();
    while let Some(path) = stack.pop() {
        let meta = fs::symlink_metadata(&path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let name = archive_name(&path)?;
        let file_type = meta.file_type();
        if file_type.is_dir() {
            let name = format!("{}/", name.trim_end_matches('/'));
            archive
                .add_bytes(&with_metadata(Entry::directory(name), &meta), &[])
                .await?;
            let mut children = Vec::new();
            let mut dir = fs::read_dir(&path)
                .await
                .with_context(|| format!("failed to read directory {}", path.display()))?;
            while let Some(child) = dir.try_next().await? {
                children.push(child.path());
            }
            children.sort();
            stack.extend(children.into_iter().rev());
        } else if file_type.is_symlink() {
            let target = fs::read_link(&path).await?;
            let target = target
                .to_str()
                .ok_or_else(|| anyhow!("link target of {} is not valid UTF-8", path.display()))?;
            archive
                .add_bytes(&with_metadata(Entry::symlink(name, target), &meta), &[])
                .await?;
        } else if file_type.is_file() {
            let f = fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            let entry = with_metadata(Entry::file(name, meta.len()), &meta);
            archive
                .add_entry(&entry, f)
                .await
                .with_context(|| format!("failed to archive {}", path.display()))?;
        } else if let Some(entry) = special_entry(name, &meta) {
            archive.add_bytes(&with_metadata(entry, &meta), &[]).await?;
        } else {
            tracing::warn!(target: "targen", "skipping {}: unsupported file type", path.display());
        }
    }
    archive.close().await?;
    Ok(())
}

fn type_char(entry_type: EntryType) -> char {
    match entry_type {
        EntryType::Regular => '-',
        EntryType::HardLink => 'h',
        EntryType::Symlink => 'l',
        EntryType::CharDevice => 'c',
        EntryType::BlockDevice => 'b',
        EntryType::Directory => 'd',
        EntryType::Fifo => 'p',
        EntryType::Other(_) => '?',
    }
}

fn mode_string(mode: u32) -> String {
    (0..9)
        .map(|i| {
            if mode & (0o400 >> i) == 0 {
                '-'
            } else {
                ['r', 'w', 'x'][i % 3]
            }
        })
        .collect()
}

fn owner(name: &str, id: u32) -> String {
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_string()
    }
}

async fn list(archive: &mut ArchiveReader<Source>) -> Result<()> {
    while let Some(entry) = archive.next_entry().await? {
        let target = match (&entry.link_name, entry.entry_type) {
            (Some(link), EntryType::Symlink) => format!(" -> {}", link),
            (Some(link), _) => format!(" link to {}", link),
            (None, _) => String::new(),
        };
        let size = match &entry.device {
            Some(device) => format!("{},{}", device.major, device.minor),
            None => entry.size.to_string(),
        };
        println!(
            "{}{} {}/{} {:>10} {:>10} {}{}",
            type_char(entry.entry_type),
            mode_string(entry.mode),
            owner(&entry.uname, entry.uid),
            owner(&entry.gname, entry.gid),
            size,
            entry.mtime,
            entry.path,
            target
        );
    }
    Ok(())
}

async fn verify(archive: &mut ArchiveReader<Source>) -> Result<()> {
    let mut entries = 0u64;
    let mut bytes = 0u64;
    while let Some(entry) = archive.next_entry().await? {
        bytes += futures_lite::io::copy(archive.data(), &mut futures_lite::io::sink())
            .await
            .with_context(|| format!("failed to read data of {}", entry.path))?;
        entries += 1;
    }
    println!(
        "{} entries, {} data bytes, {} archive bytes",
        entries,
        bytes,
        archive.position()
    );
    Ok(())
}

async fn run(cmd: Command) -> Result<()> {
    match cmd {
        Command::Create {
            file,
            long_names,
            paths,
        } => {
            let options = WriterOptions::default().long_names(long_names);
            let mut archive = ArchiveWriter::with_options(open_sink(&file).await?, options);
            create(&mut archive, &paths).await
        }
        Command::List { file, lenient } => {
            let source = open_source(&file).await?;
            list(&mut ArchiveReader::with_options(source, reader_options(lenient))).await
        }
        Command::Verify { file, lenient } => {
            let source = open_source(&file).await?;
            verify(&mut ArchiveReader::with_options(source, reader_options(lenient))).await
        }
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let format = fmt::format().without_time().with_target(true);
    fmt()
        .with_env_filter(filter)
        .event_format(format)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
}

fn main() -> ExitCode {
    let cli = App::parse();
    if let Err(err) = init_logging() {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }
    match smol::block_on(run(cli.cmd)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("targen: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
