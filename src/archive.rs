//! Writing archives whose members are streamed without knowing their size up front.
//!
//! An [`ArchiveSession`] owns a seekable sink and hands out one member writer at a time. Each
//! member is written as a placeholder header recording size 0, followed by the payload as it
//! arrives. Closing the member pads the data to a block boundary, seeks back to rewrite the
//! header with the real size, and seeks forward again so the next member can follow.
//!
//! Until a member is closed, the archive on disk is inconsistent: a standard reader sees the
//! placeholder's size 0 and would take the payload for the next header. Member writers therefore
//! close themselves when dropped; only a failure during that close (or leaking the writer) leaves
//! the session with an unpatched header, after which the session refuses further work.

mod compress;
mod file;
mod member;
mod session;

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::time::{SystemTime, UNIX_EPOCH};

pub use compress::{CompressingMemberWriter, Compressor, GzipCompressor};
pub use file::stream_file;
pub use member::{MemberSummary, StreamingMemberWriter};
pub use session::ArchiveSession;

use crate::header::TarHeader;

/// Caller supplied metadata for one member. The size is never part of it; that is what the
/// member writer works out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMetadata {
    pub name: String,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    /// Seconds since the epoch.
    pub mtime: u64,
    pub uname: String,
    pub gname: String,
}

impl MemberMetadata {
    /// Metadata for a regular file owned by root, modified now.
    pub fn new(name: impl Into<String>) -> Self {
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: name.into(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            mtime,
            uname: String::new(),
            gname: String::new(),
        }
    }

    /// Take mode, ownership and mtime from file system metadata.
    pub fn from_fs(name: impl Into<String>, metadata: &fs::Metadata) -> Self {
        Self {
            mode: metadata.mode() & 0o7777,
            uid: u64::from(metadata.uid()),
            gid: u64::from(metadata.gid()),
            // files from before the epoch are clamped to it
            mtime: u64::try_from(metadata.mtime()).unwrap_or(0),
            ..Self::new(name)
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn owner(mut self, uid: u64, gid: u64) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn owner_names(mut self, uname: impl Into<String>, gname: impl Into<String>) -> Self {
        self.uname = uname.into();
        self.gname = gname.into();
        self
    }

    pub fn mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// The placeholder header for this member.
    pub(crate) fn to_header(&self) -> TarHeader {
        TarHeader {
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            mtime: self.mtime,
            uname: self.uname.clone(),
            gname: self.gname.clone(),
            ..TarHeader::new(self.name.clone())
        }
    }
}
