//! The USTAR header block: a 512 byte record describing one archive member.

/*
 * Layout of the header block -
 *
 * +-------------+-------+--------+------------------------------------------------+
 * | Field       | Size  | Offset | Remarks                                        |
 * +-------------+-------+--------+------------------------------------------------+
 * | name        | 100   | 0      | NUL padded; unterminated if exactly 100 bytes  |
 * | mode        | 8     | 100    | octal, NUL terminated                          |
 * | uid         | 8     | 108    | octal, NUL terminated                          |
 * | gid         | 8     | 116    | octal, NUL terminated                          |
 * | size        | 12    | 124    | octal, or base-256 when it doesn't fit         |
 * | mtime       | 12    | 136    | octal, seconds since the epoch                 |
 * | checksum    | 8     | 148    | six octal digits, NUL, space                   |
 * | typeflag    | 1     | 156    |                                                |
 * | linkname    | 100   | 157    |                                                |
 * | magic       | 6     | 257    | "ustar\0"                                      |
 * | version     | 2     | 263    | "00"                                           |
 * | uname       | 32    | 265    | NUL terminated                                 |
 * | gname       | 32    | 297    | NUL terminated                                 |
 * | devmajor    | 8     | 329    |                                                |
 * | devminor    | 8     | 337    |                                                |
 * | prefix      | 155   | 345    | leading directories of a name over 100 bytes   |
 * | (padding)   | 12    | 500    | zero                                           |
 * +-------------+-------+--------+------------------------------------------------+
 *
 * The checksum is the sum of all 512 bytes as unsigned values, with the checksum field itself
 * counted as eight spaces.
 */

use std::ops::Range;

use crate::byteorder::{bytes_to_string, bytes_to_u64, str_to_bytes, u64_to_octal};
use crate::error::{ArchiveError, Result};

pub const HEADER_SIZE: usize = 512;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const UNAME: Range<usize> = 265..297;
const GNAME: Range<usize> = 297..329;
const DEVMAJOR: Range<usize> = 329..337;
const DEVMINOR: Range<usize> = 337..345;
const PREFIX: Range<usize> = 345..500;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";

/// A decoded header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// Full member path; split across `prefix` and `name` when longer than 100 bytes.
    pub name: String,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub size: u64,
    pub mtime: u64,
    pub type_flag: TypeFlag,
    pub link_name: String,
    pub uname: String,
    pub gname: String,
    pub dev_major: u32,
    pub dev_minor: u32,
}

impl TarHeader {
    /// A regular file header with every other field defaulted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            type_flag: TypeFlag::Regular,
            link_name: String::new(),
            uname: String::new(),
            gname: String::new(),
            dev_major: 0,
            dev_minor: 0,
        }
    }

    /// Serialize the header into a 512 byte block. Fails before producing anything if a field
    /// does not fit.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut block = [0u8; HEADER_SIZE];
        let (prefix, name) = split_name(&self.name)?;
        str_to_bytes("name", name, &mut block[NAME])?;
        u64_to_octal("mode", u64::from(self.mode), &mut block[MODE])?;
        u64_to_octal("uid", self.uid, &mut block[UID])?;
        u64_to_octal("gid", self.gid, &mut block[GID])?;
        u64_to_octal("size", self.size, &mut block[SIZE])?;
        u64_to_octal("mtime", self.mtime, &mut block[MTIME])?;
        block[TYPEFLAG] = self.type_flag.as_byte();
        str_to_bytes("linkname", &self.link_name, &mut block[LINKNAME])?;
        block[MAGIC].copy_from_slice(USTAR_MAGIC);
        block[VERSION].copy_from_slice(USTAR_VERSION);
        // user and group names always keep their terminator
        str_to_bytes("uname", &self.uname, &mut block[UNAME.start..UNAME.end - 1])?;
        str_to_bytes("gname", &self.gname, &mut block[GNAME.start..GNAME.end - 1])?;
        u64_to_octal("devmajor", u64::from(self.dev_major), &mut block[DEVMAJOR])?;
        u64_to_octal("devminor", u64::from(self.dev_minor), &mut block[DEVMINOR])?;
        str_to_bytes("prefix", prefix, &mut block[PREFIX])?;

        set_checksum(&mut block);
        Ok(block)
    }

    /// Parse a header block, verifying its checksum.
    pub fn decode(block: &[u8]) -> Result<Self> {
        if block.len() != HEADER_SIZE {
            return Err(ArchiveError::format(format!(
                "invalid header block length: {}; expected {}",
                block.len(),
                HEADER_SIZE
            )));
        }
        let stored = bytes_to_u64("checksum", &block[CHECKSUM])?;
        let calculated = u64::from(calculate_checksum(block));
        if stored != calculated {
            return Err(ArchiveError::format(format!(
                "checksum mismatch; stored: {}, calculated: {}",
                stored, calculated
            )));
        }
        if &block[MAGIC.start..MAGIC.end - 1] != b"ustar" {
            return Err(ArchiveError::format("missing ustar magic"));
        }

        let name = bytes_to_string("name", &block[NAME])?;
        let prefix = bytes_to_string("prefix", &block[PREFIX])?;
        let name = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        Ok(Self {
            name,
            mode: narrow("mode", bytes_to_u64("mode", &block[MODE])?)?,
            uid: bytes_to_u64("uid", &block[UID])?,
            gid: bytes_to_u64("gid", &block[GID])?,
            size: bytes_to_u64("size", &block[SIZE])?,
            mtime: bytes_to_u64("mtime", &block[MTIME])?,
            type_flag: TypeFlag::from_byte(block[TYPEFLAG])?,
            link_name: bytes_to_string("linkname", &block[LINKNAME])?,
            uname: bytes_to_string("uname", &block[UNAME])?,
            gname: bytes_to_string("gname", &block[GNAME])?,
            dev_major: narrow("devmajor", bytes_to_u64("devmajor", &block[DEVMAJOR])?)?,
            dev_minor: narrow("devminor", bytes_to_u64("devminor", &block[DEVMINOR])?)?,
        })
    }
}

/// Rewrite the size of an encoded header, returning a new block with a fresh checksum. The
/// original block is left untouched.
pub fn patch_size(original: &[u8; HEADER_SIZE], new_size: u64) -> Result<[u8; HEADER_SIZE]> {
    let mut header = TarHeader::decode(original)?;
    header.size = new_size;
    header.encode()
}

/// Sum of all bytes in the block, with the checksum field counted as spaces.
pub fn calculate_checksum(block: &[u8]) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, &byte)| {
            if CHECKSUM.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(byte)
            }
        })
        .sum()
}

fn set_checksum(block: &mut [u8; HEADER_SIZE]) {
    let checksum = calculate_checksum(block);
    // the sum of 512 bytes never exceeds six octal digits
    let digits = format!("{:06o}", checksum);
    block[CHECKSUM.start..CHECKSUM.start + 6].copy_from_slice(digits.as_bytes());
    block[CHECKSUM.start + 6] = 0;
    block[CHECKSUM.start + 7] = b' ';
}

/// Split a path into USTAR `(prefix, name)`. The prefix is the longest run of leading
/// directories that fits 155 bytes.
fn split_name(path: &str) -> Result<(&str, &str)> {
    if path.len() <= NAME.len() {
        return Ok(("", path));
    }
    let split = path
        .match_indices('/')
        .map(|(i, _)| i)
        .rev()
        .find(|&i| i > 0 && i <= PREFIX.len());
    match split {
        Some(i) if !path[i + 1..].is_empty() && path.len() - i - 1 <= NAME.len() => {
            Ok((&path[..i], &path[i + 1..]))
        }
        _ => Err(ArchiveError::encoding(
            "name",
            format!(
                "{} bytes does not fit a ustar name/prefix split: {}",
                path.len(),
                path
            ),
        )),
    }
}

fn narrow(field: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ArchiveError::format(format!("field `{}` out of range: {}", field, value)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFlag {
    Regular,
    HardLink,
    SymLink,
    Directory,
}

impl TypeFlag {
    pub fn as_byte(&self) -> u8 {
        match self {
            TypeFlag::Regular => b'0',
            TypeFlag::HardLink => b'1',
            TypeFlag::SymLink => b'2',
            TypeFlag::Directory => b'5',
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            // pre-POSIX archives mark regular files with NUL
            b'0' | 0 => Ok(TypeFlag::Regular),
            b'1' => Ok(TypeFlag::HardLink),
            b'2' => Ok(TypeFlag::SymLink),
            b'5' => Ok(TypeFlag::Directory),
            _ => Err(ArchiveError::format(format!(
                "invalid typeflag byte: {:?}",
                byte
            ))),
        }
    }
}
