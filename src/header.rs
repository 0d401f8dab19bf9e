//! Header block codec.
//!
//! A header is one 512-byte block with the classic tar fields at fixed
//! offsets: name@0, mode@100, uid@108, gid@116, size@124, mtime@136,
//! chksum@148, typeflag@156, linkname@157 and, for ustar, magic@257,
//! version@263, uname@265, gname@297, devmajor@329, devminor@337 and
//! prefix@345. Numeric fields are NUL terminated octal; values that do not fit
//! fall back to the GNU base-256 encoding. The checksum is the unsigned sum of
//! all header bytes with the checksum field read as eight ASCII spaces.
//!
//! Besides plain entries the codec knows the extension records a reader has to
//! consume before the entry they describe: GNU long name/link (`L`/`K`) and
//! POSIX PAX (`x`/`g`).
use {
    crate::error::FormatError,
    std::{fmt::Write as _, str::from_utf8},
};

pub const BLOCK_SIZE: usize = 512;

/// One archive block.
pub type Block = [u8; BLOCK_SIZE];

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const OWNER_NAME_LEN: usize = 32;

/// Longest path a ustar header stores without an extension record.
pub const MAX_USTAR_PATH: usize = PREFIX_LEN + 1 + NAME_LEN;

const CHECKSUM_OFFSET: usize = 148;
const CHECKSUM_LEN: usize = 8;
const TYPEFLAG_OFFSET: usize = 156;

const GNU_LONG_LINK_NAME: &str = "././@LongLink";
const PAX_HEADER_NAME: &str = "././@PaxHeader";

type CodecResult<T> = std::result::Result<T, FormatError>;

#[repr(C)]
struct Header {
    record: Block,
}

enum HeaderKind<'a> {
    Gnu(&'a GnuHeader),
    Ustar(&'a UstarHeader),
    Old(&'a OldHeader),
}

trait HeaderVariant {}

impl Header {
    fn new() -> Self {
        Self {
            record: [0u8; BLOCK_SIZE],
        }
    }
    fn ustar() -> Self {
        let mut header = Self::new();
        let hdr = header.ustar_mut();
        hdr.magic = *b"ustar\0";
        hdr.version = *b"00";
        header
    }
    fn gnu() -> Self {
        let mut header = Self::new();
        let hdr = header.ustar_mut();
        hdr.magic = *b"ustar ";
        hdr.version = *b" \0";
        header
    }
    fn from_block(block: &Block) -> Self {
        Self { record: *block }
    }
    unsafe fn cast<U: HeaderVariant>(&self) -> &U {
        &*(self as *const Self as *const U)
    }
    fn ustar_mut(&mut self) -> &mut UstarHeader {
        // SAFETY: UstarHeader is a repr(C) block of byte arrays, 512 bytes
        // long with alignment 1, same as Header.
        unsafe { &mut *(self as *mut Self as *mut UstarHeader) }
    }
    fn common(&self) -> &OldHeader {
        // SAFETY: every variant shares the v7 field layout.
        unsafe { self.cast::<OldHeader>() }
    }
    fn kind(&self) -> HeaderKind<'_> {
        let gnu = unsafe { self.cast::<GnuHeader>() };
        if gnu.magic == *b"ustar " && gnu.version == *b" \0" {
            HeaderKind::Gnu(gnu)
        } else if gnu.magic == *b"ustar\0" && gnu.version == *b"00" {
            HeaderKind::Ustar(unsafe { self.cast::<UstarHeader>() })
        } else {
            HeaderKind::Old(self.common())
        }
    }
    fn typeflag(&self) -> u8 {
        self.record[TYPEFLAG_OFFSET]
    }
    fn checksum(&self) -> u32 {
        checksum(&self.record)
    }
    fn stored_checksum(&self) -> CodecResult<u32> {
        parse_numeric(&self.common().cksum, "chksum").and_then(|v| narrow(v, "chksum"))
    }
    /// Blank the checksum field, sum the block and store the result as six
    /// octal digits followed by NUL and a space.
    fn finalize(&mut self) -> CodecResult<()> {
        let sum = self.checksum();
        let field = &mut self.ustar_mut().cksum;
        format_octal(u64::from(sum), &mut field[..CHECKSUM_LEN - 1], "chksum")?;
        field[CHECKSUM_LEN - 1] = b' ';
        Ok(())
    }
}

#[repr(C)]
#[allow(dead_code)]
struct OldHeader {
    name: [u8; NAME_LEN],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    size: [u8; 12],
    mtime: [u8; 12],
    cksum: [u8; 8],
    linkflag: [u8; 1],
    linkname: [u8; NAME_LEN],
    pad: [u8; 255],
}
impl HeaderVariant for OldHeader {}

#[repr(C)]
#[allow(dead_code)]
struct UstarHeader {
    name: [u8; NAME_LEN],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    size: [u8; 12],
    mtime: [u8; 12],
    cksum: [u8; 8],
    typeflag: [u8; 1],
    linkname: [u8; NAME_LEN],
    magic: [u8; 6],
    version: [u8; 2],
    uname: [u8; OWNER_NAME_LEN],
    gname: [u8; OWNER_NAME_LEN],
    dev_major: [u8; 8],
    dev_minor: [u8; 8],
    prefix: [u8; PREFIX_LEN],
    pad: [u8; 12],
}
impl HeaderVariant for UstarHeader {}

#[repr(C)]
#[allow(dead_code)]
struct GnuHeader {
    name: [u8; NAME_LEN],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    size: [u8; 12],
    mtime: [u8; 12],
    cksum: [u8; 8],
    typeflag: [u8; 1],
    linkname: [u8; NAME_LEN],
    magic: [u8; 6],
    version: [u8; 2],
    uname: [u8; OWNER_NAME_LEN],
    gname: [u8; OWNER_NAME_LEN],
    dev_major: [u8; 8],
    dev_minor: [u8; 8],
    atime: [u8; 12],
    ctime: [u8; 12],
    offset: [u8; 12],
    longnames: [u8; 4],
    unused: [u8; 1],
    sparse: [u8; 96],
    isextended: [u8; 1],
    realsize: [u8; 12],
    pad: [u8; 17],
}
impl HeaderVariant for GnuHeader {}

/// Kind of archive member a header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Regular,
    HardLink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
    /// Any other typeflag, such as GNU volume labels (`V`) or sparse files
    /// (`S`). Its data region is framed like a regular file's.
    Other(u8),
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Other(flag) => return write!(f, "entry of type {:?}", char::from(*flag)),
            Self::Regular => "regular file",
            Self::HardLink => "link",
            Self::Symlink => "symlink",
            Self::CharDevice => "character device",
            Self::BlockDevice => "block device",
            Self::Directory => "directory",
            Self::Fifo => "FIFO",
        })
    }
}

impl EntryType {
    /// The byte stored at the typeflag offset.
    pub fn typeflag(self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::HardLink => b'1',
            Self::Symlink => b'2',
            Self::CharDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Other(flag) => flag,
        }
    }
    /// Maps a typeflag to an entry type. The legacy NUL flag and contiguous
    /// files (`7`) are read as regular files.
    pub fn from_typeflag(b: u8) -> Self {
        match b {
            b'\0' | b'0' | b'7' => Self::Regular,
            b'1' => Self::HardLink,
            b'2' => Self::Symlink,
            b'3' => Self::CharDevice,
            b'4' => Self::BlockDevice,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            b => Self::Other(b),
        }
    }
    /// Whether data blocks follow a header of this type.
    pub fn has_data(self) -> bool {
        matches!(self, Self::Regular | Self::Other(_))
    }
    pub fn is_link(self) -> bool {
        matches!(self, Self::HardLink | Self::Symlink)
    }
    pub fn is_device(self) -> bool {
        matches!(self, Self::CharDevice | Self::BlockDevice)
    }
}

/// Records that modify the entry following them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extension {
    GnuLongName,
    GnuLongLink,
    PaxLocal,
    PaxGlobal,
}

impl std::fmt::Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::GnuLongName => "GNU long name extension",
            Self::GnuLongLink => "GNU long link extension",
            Self::PaxLocal => "PAX next file extension",
            Self::PaxGlobal => "PAX global extension",
        })
    }
}

impl Extension {
    fn typeflag(self) -> u8 {
        match self {
            Self::GnuLongName => b'L',
            Self::GnuLongLink => b'K',
            Self::PaxLocal => b'x',
            Self::PaxGlobal => b'g',
        }
    }
}

enum Kind {
    Entry(EntryType),
    Extension(Extension),
}

impl Kind {
    fn from_byte(b: u8) -> Self {
        match b {
            b'L' => Kind::Extension(Extension::GnuLongName),
            b'K' => Kind::Extension(Extension::GnuLongLink),
            b'x' => Kind::Extension(Extension::PaxLocal),
            b'g' => Kind::Extension(Extension::PaxGlobal),
            b => Kind::Entry(EntryType::from_typeflag(b)),
        }
    }
}

/// Device numbers of a character or block device entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub major: u32,
    pub minor: u32,
}

/// Metadata of one archive member.
///
/// The checksum is not part of the entry: it is always recomputed by
/// [`encode`] and verified by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub entry_type: EntryType,
    /// Length of the data region. Must be zero for entry types without data.
    pub size: u64,
    pub mode: u32,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: u64,
    pub uid: u32,
    pub gid: u32,
    pub uname: String,
    pub gname: String,
    /// Target of a hard link or symlink.
    pub link_name: Option<String>,
    pub device: Option<Device>,
}

impl Entry {
    fn new(path: impl Into<String>, entry_type: EntryType, mode: u32) -> Self {
        Self {
            path: path.into(),
            entry_type,
            size: 0,
            mode,
            mtime: 0,
            uid: 0,
            gid: 0,
            uname: String::new(),
            gname: String::new(),
            link_name: None,
            device: None,
        }
    }
    /// Regular file holding `size` bytes.
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            size,
            ..Self::new(path, EntryType::Regular, 0o644)
        }
    }
    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(path, EntryType::Directory, 0o755)
    }
    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            link_name: Some(target.into()),
            ..Self::new(path, EntryType::Symlink, 0o777)
        }
    }
    pub fn hard_link(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            link_name: Some(target.into()),
            ..Self::new(path, EntryType::HardLink, 0o644)
        }
    }
    pub fn char_device(path: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            device: Some(Device { major, minor }),
            ..Self::new(path, EntryType::CharDevice, 0o600)
        }
    }
    pub fn block_device(path: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            device: Some(Device { major, minor }),
            ..Self::new(path, EntryType::BlockDevice, 0o600)
        }
    }
    pub fn fifo(path: impl Into<String>) -> Self {
        Self::new(path, EntryType::Fifo, 0o644)
    }
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }
    pub fn with_owner_names(mut self, uname: impl Into<String>, gname: impl Into<String>) -> Self {
        self.uname = uname.into();
        self.gname = gname.into();
        self
    }
    /// Number of data bytes that follow the header in the archive.
    pub fn data_len(&self) -> u64 {
        if self.entry_type.has_data() {
            self.size
        } else {
            0
        }
    }
}

/// Unsigned byte sum of `block` with the checksum field counted as spaces.
pub fn checksum(block: &Block) -> u32 {
    let blanked = CHECKSUM_LEN as u32 * u32::from(b' ');
    block[..CHECKSUM_OFFSET]
        .iter()
        .chain(&block[CHECKSUM_OFFSET + CHECKSUM_LEN..])
        .map(|b| u32::from(*b))
        .sum::<u32>()
        + blanked
}

/// Serialize `entry` into a ustar header block.
///
/// Fails with [`FormatError::NameTooLong`] when the path cannot be split into
/// `prefix`/`name`, or when the link target or owner names exceed their
/// fields. Long names need an extension record, see
/// [`ArchiveWriter`](crate::ArchiveWriter).
///
/// The size field always describes the data region that follows: an entry
/// type without data and a non-zero `size` fails with
/// [`FormatError::SizeMismatch`]. An [`EntryType::Other`] flag that belongs
/// to a known type or extension fails with
/// [`FormatError::UnsupportedEntryType`].
pub fn encode(entry: &Entry) -> CodecResult<Block> {
    encode_header(entry, false).map(|header| header.record)
}

/// Like [`encode`], but over-long paths and link targets are cut to fit so
/// the block can follow an extension record carrying the full value.
pub(crate) fn encode_truncated(entry: &Entry) -> CodecResult<Block> {
    encode_header(entry, true).map(|header| header.record)
}

fn encode_header(entry: &Entry, truncate: bool) -> CodecResult<Header> {
    if entry.size != entry.data_len() {
        return Err(FormatError::SizeMismatch {
            expected: entry.data_len(),
            actual: entry.size,
        });
    }
    if let EntryType::Other(flag) = entry.entry_type {
        if !matches!(Kind::from_byte(flag), Kind::Entry(EntryType::Other(_))) {
            return Err(FormatError::UnsupportedEntryType(flag));
        }
    }
    let mut header = Header::ustar();
    let hdr = header.ustar_mut();
    match split_path(&entry.path) {
        Ok((prefix, name)) => {
            hdr.prefix[..prefix.len()].copy_from_slice(prefix.as_bytes());
            hdr.name[..name.len()].copy_from_slice(name.as_bytes());
        }
        Err(_) if truncate => copy_utf8_truncate(&mut hdr.name, &entry.path),
        Err(err) => return Err(err),
    }
    if let Some(link_name) = &entry.link_name {
        if link_fits(link_name) {
            hdr.linkname[..link_name.len()].copy_from_slice(link_name.as_bytes());
        } else if truncate {
            copy_utf8_truncate(&mut hdr.linkname, link_name);
        } else {
            return Err(FormatError::NameTooLong {
                len: link_name.len(),
                max: NAME_LEN,
            });
        }
    }
    copy_owner_name(&mut hdr.uname, &entry.uname)?;
    copy_owner_name(&mut hdr.gname, &entry.gname)?;
    format_numeric(u64::from(entry.mode), &mut hdr.mode, "mode")?;
    format_numeric(u64::from(entry.uid), &mut hdr.uid, "uid")?;
    format_numeric(u64::from(entry.gid), &mut hdr.gid, "gid")?;
    format_numeric(entry.size, &mut hdr.size, "size")?;
    format_numeric(entry.mtime, &mut hdr.mtime, "mtime")?;
    hdr.typeflag[0] = entry.entry_type.typeflag();
    if let Some(device) = entry.device {
        format_numeric(u64::from(device.major), &mut hdr.dev_major, "devmajor")?;
        format_numeric(u64::from(device.minor), &mut hdr.dev_minor, "devminor")?;
    }
    header.finalize()?;
    Ok(header)
}

/// Header block announcing an extension record of `size` payload bytes.
pub(crate) fn encode_extension(ext: Extension, size: u64) -> CodecResult<Block> {
    let (mut header, name) = match ext {
        Extension::GnuLongName | Extension::GnuLongLink => (Header::gnu(), GNU_LONG_LINK_NAME),
        Extension::PaxLocal | Extension::PaxGlobal => (Header::ustar(), PAX_HEADER_NAME),
    };
    let hdr = header.ustar_mut();
    hdr.name[..name.len()].copy_from_slice(name.as_bytes());
    format_numeric(0, &mut hdr.mode, "mode")?;
    format_numeric(0, &mut hdr.uid, "uid")?;
    format_numeric(0, &mut hdr.gid, "gid")?;
    format_numeric(0, &mut hdr.mtime, "mtime")?;
    format_numeric(size, &mut hdr.size, "size")?;
    hdr.typeflag[0] = ext.typeflag();
    header.finalize()?;
    Ok(header.record)
}

/// Result of decoding a header block that may be an extension record.
pub(crate) enum Decoded {
    Entry(Entry),
    Extension { kind: Extension, size: u64 },
}

/// Parse a header block, verifying its checksum first.
///
/// Extension records (`L`, `K`, `x`, `g`) are rejected with
/// [`FormatError::UnsupportedEntryType`]; only an archive reader can pair them
/// with the entry they modify.
pub fn decode(block: &Block) -> CodecResult<Entry> {
    match decode_header(block)? {
        Decoded::Entry(entry) => Ok(entry),
        Decoded::Extension { kind, .. } => Err(FormatError::UnsupportedEntryType(kind.typeflag())),
    }
}

pub(crate) fn decode_header(block: &Block) -> CodecResult<Decoded> {
    let header = Header::from_block(block);
    let stored = header.stored_checksum()?;
    let computed = header.checksum();
    if stored != computed {
        return Err(FormatError::ChecksumMismatch { stored, computed });
    }
    let common = header.common();
    let size = parse_numeric(&common.size, "size")?;
    let entry_type = match Kind::from_byte(header.typeflag()) {
        Kind::Entry(entry_type) => entry_type,
        Kind::Extension(kind) => return Ok(Decoded::Extension { kind, size }),
    };
    let (path, uname, gname, device) = match header.kind() {
        HeaderKind::Ustar(hdr) => (
            ustar_path_name(&hdr.name, &hdr.prefix)?,
            owner_name(&hdr.uname, "uname")?,
            owner_name(&hdr.gname, "gname")?,
            device(entry_type, &hdr.dev_major, &hdr.dev_minor)?,
        ),
        HeaderKind::Gnu(hdr) => (
            path_name(&hdr.name, "name")?.to_string(),
            owner_name(&hdr.uname, "uname")?,
            owner_name(&hdr.gname, "gname")?,
            device(entry_type, &hdr.dev_major, &hdr.dev_minor)?,
        ),
        HeaderKind::Old(hdr) => (
            path_name(&hdr.name, "name")?.to_string(),
            String::new(),
            String::new(),
            None,
        ),
    };
    let entry_type = if entry_type == EntryType::Regular
        && matches!(header.kind(), HeaderKind::Old(_))
        && path.ends_with('/')
    {
        EntryType::Directory
    } else {
        entry_type
    };
    let link_name = if entry_type.is_link() {
        Some(path_name(&common.linkname, "linkname")?.to_string())
    } else {
        None
    };
    Ok(Decoded::Entry(Entry {
        path,
        entry_type,
        size,
        mode: parse_numeric(&common.mode, "mode").and_then(|v| narrow(v, "mode"))?,
        mtime: parse_numeric(&common.mtime, "mtime")?,
        uid: parse_numeric(&common.uid, "uid").and_then(|v| narrow(v, "uid"))?,
        gid: parse_numeric(&common.gid, "gid").and_then(|v| narrow(v, "gid"))?,
        uname,
        gname,
        link_name,
        device,
    }))
}

fn device(
    entry_type: EntryType,
    major: &[u8; 8],
    minor: &[u8; 8],
) -> CodecResult<Option<Device>> {
    if !entry_type.is_device() {
        return Ok(None);
    }
    Ok(Some(Device {
        major: parse_numeric(major, "devmajor").and_then(|v| narrow(v, "devmajor"))?,
        minor: parse_numeric(minor, "devminor").and_then(|v| narrow(v, "devminor"))?,
    }))
}

/// Split a path into ustar `prefix` and `name` parts.
pub(crate) fn split_path(path: &str) -> CodecResult<(&str, &str)> {
    let bytes = path.as_bytes();
    if bytes.len() <= NAME_LEN {
        return Ok(("", path));
    }
    if bytes.len() > MAX_USTAR_PATH {
        return Err(FormatError::NameTooLong {
            len: bytes.len(),
            max: MAX_USTAR_PATH,
        });
    }
    // the rightmost usable slash leaves the shortest name
    bytes
        .iter()
        .enumerate()
        .rev()
        .find(|(i, b)| **b == b'/' && *i > 0 && *i <= PREFIX_LEN && *i + 1 < bytes.len())
        .map(|(i, _)| i)
        .filter(|i| bytes.len() - i - 1 <= NAME_LEN)
        .map(|i| (&path[..i], &path[i + 1..]))
        .ok_or(FormatError::NameTooLong {
            len: bytes.len(),
            max: NAME_LEN,
        })
}

/// Whether a link target fits the `linkname` field.
pub(crate) fn link_fits(link_name: &str) -> bool {
    link_name.len() <= NAME_LEN
}

fn copy_utf8_truncate(field: &mut [u8], s: &str) {
    let mut cut = std::cmp::min(field.len(), s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    field[..cut].copy_from_slice(&s.as_bytes()[..cut]);
}

fn copy_owner_name(field: &mut [u8; OWNER_NAME_LEN], name: &str) -> CodecResult<()> {
    if name.len() > OWNER_NAME_LEN {
        return Err(FormatError::NameTooLong {
            len: name.len(),
            max: OWNER_NAME_LEN,
        });
    }
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(())
}

fn null_terminated(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes
        .iter()
        .position(|b| *b == b'\0')
        .unwrap_or(bytes.len())]
}

fn path_name<'a>(name: &'a [u8], field: &'static str) -> CodecResult<&'a str> {
    from_utf8(null_terminated(name)).map_err(|_| FormatError::InvalidUtf8 { field })
}

fn owner_name(name: &[u8], field: &'static str) -> CodecResult<String> {
    path_name(name, field).map(str::to_string)
}

fn ustar_path_name(name: &[u8; NAME_LEN], prefix: &[u8; PREFIX_LEN]) -> CodecResult<String> {
    let name = path_name(name, "name")?;
    if prefix[0] == b'\0' {
        return Ok(name.to_string());
    }
    let prefix = path_name(prefix, "prefix")?;
    let mut path = String::with_capacity(prefix.len() + 1 + name.len());
    path.push_str(prefix);
    path.push('/');
    path.push_str(name);
    Ok(path)
}

fn narrow(value: u64, field: &'static str) -> CodecResult<u32> {
    u32::try_from(value).map_err(|_| FormatError::NumericOverflow { field, value })
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let mut n = 0u64;
    for d in field.iter().skip_while(|d| **d == b' ') {
        match d {
            b'0'..=b'7' => n = n.checked_mul(8)?.checked_add(u64::from(d - b'0'))?,
            b'\0' | b' ' => break,
            _ => return None,
        }
    }
    Some(n)
}

/// Octal, or GNU base-256 when the high bit of the first byte is set.
fn parse_numeric(field: &[u8], name: &'static str) -> CodecResult<u64> {
    match field {
        [first, rest @ ..] if first & 0x80 != 0 => {
            // bit 6 is the sign, negative values are never valid here
            if first & 0x40 != 0 {
                return Err(FormatError::InvalidNumeric { field: name });
            }
            rest.iter()
                .try_fold(u64::from(first & 0x3f), |n, b| {
                    n.checked_mul(256)?.checked_add(u64::from(*b))
                })
                .ok_or(FormatError::InvalidNumeric { field: name })
        }
        _ => parse_octal(field).ok_or(FormatError::InvalidNumeric { field: name }),
    }
}

fn format_octal(val: u64, field: &mut [u8], name: &'static str) -> CodecResult<()> {
    let mut value = val;
    let mut len = field.len() - 1;
    field[len] = 0;
    while len > 0 {
        len -= 1;
        field[len] = b'0' + (value & 0o7) as u8;
        value >>= 3;
    }
    if value != 0 {
        return Err(FormatError::NumericOverflow { field: name, value: val });
    }
    Ok(())
}

fn format_numeric(val: u64, field: &mut [u8], name: &'static str) -> CodecResult<()> {
    if format_octal(val, field, name).is_ok() {
        return Ok(());
    }
    let (first, rest) = field
        .split_first_mut()
        .ok_or(FormatError::NumericOverflow { field: name, value: val })?;
    if rest.len() < 8 && val >> (8 * rest.len()) != 0 {
        return Err(FormatError::NumericOverflow { field: name, value: val });
    }
    let bytes = val.to_be_bytes();
    let n = std::cmp::min(rest.len(), bytes.len());
    rest.fill(0);
    let tail = rest.len() - n;
    rest[tail..].copy_from_slice(&bytes[bytes.len() - n..]);
    *first = 0x80;
    Ok(())
}

/// Payload of a GNU long name or long link record: the value plus a NUL.
pub(crate) fn long_name_payload(value: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(value.len() + 1);
    payload.extend_from_slice(value.as_bytes());
    payload.push(0);
    payload
}

pub(crate) fn parse_long_name(payload: &[u8]) -> CodecResult<String> {
    path_name(payload, "long name").map(str::to_string)
}

/// Payload of a PAX record set: `<LEN> SP <KEY>=<VALUE> LF` per record.
pub(crate) fn pax_payload(records: &[(&str, &str)]) -> Vec<u8> {
    let mut payload = String::new();
    for (key, value) in records {
        let len = pax_record_len(key, value.len());
        // writing into a String cannot fail
        let _ = writeln!(payload, "{} {}={}", len, key, value);
    }
    payload.into_bytes()
}

fn pax_record_len(key: &str, val_len: usize) -> usize {
    // <LEN> SP <KEY>=<VALUE>\n
    let payload_len = key.len() + 1 + val_len + 1;
    let mut len = payload_len + 1 + 1;
    loop {
        let new_len = payload_len + 1 + num_decimal_digits(len);
        if new_len == len {
            return len;
        }
        len = new_len;
    }
}

#[inline]
fn num_decimal_digits(mut n: usize) -> usize {
    let mut c = 1;
    while n >= 10 {
        n /= 10;
        c += 1;
    }
    c
}

/// Parsed PAX extended header records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PaxExtension {
    records: Vec<(String, String)>,
}

impl PaxExtension {
    pub(crate) fn parse(payload: &[u8]) -> CodecResult<Self> {
        let mut records = Vec::new();
        let mut rest = payload;
        while let Some(&first) = rest.first() {
            if first == b'\0' {
                break;
            }
            let space = rest
                .iter()
                .position(|b| *b == b' ')
                .ok_or(FormatError::InvalidPaxRecord)?;
            let len: usize = from_utf8(&rest[..space])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(FormatError::InvalidPaxRecord)?;
            if len <= space + 1 || len > rest.len() || rest[len - 1] != b'\n' {
                return Err(FormatError::InvalidPaxRecord);
            }
            let record = &rest[space + 1..len - 1];
            let eq = record
                .iter()
                .position(|b| *b == b'=')
                .ok_or(FormatError::InvalidPaxRecord)?;
            let key = from_utf8(&record[..eq])
                .map_err(|_| FormatError::InvalidUtf8 { field: "pax key" })?;
            let value = from_utf8(&record[eq + 1..])
                .map_err(|_| FormatError::InvalidUtf8 { field: "pax value" })?;
            records.push((key.to_string(), value.to_string()));
            rest = &rest[len..];
        }
        Ok(Self { records })
    }

    /// Override header fields of `entry` with the records this set carries.
    pub(crate) fn apply(&self, entry: &mut Entry) -> CodecResult<()> {
        for (key, value) in &self.records {
            tracing::trace!(target: "tar", "PAX ext key={} val={}", key, value);
            match key.as_str() {
                "path" => entry.path = value.clone(),
                "linkpath" => entry.link_name = Some(value.clone()),
                "size" => entry.size = parse_decimal(value, "size")?,
                "mtime" => {
                    let secs = value.split_once('.').map_or(value.as_str(), |(secs, _)| secs);
                    entry.mtime = parse_decimal(secs, "mtime")?;
                }
                "uid" => entry.uid = narrow(parse_decimal(value, "uid")?, "uid")?,
                "gid" => entry.gid = narrow(parse_decimal(value, "gid")?, "gid")?,
                "uname" => entry.uname = value.clone(),
                "gname" => entry.gname = value.clone(),
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_decimal(value: &str, field: &'static str) -> CodecResult<u64> {
    value
        .parse()
        .map_err(|_| FormatError::InvalidNumeric { field })
}
