//! Write tar archives whose members are streamed without knowing their size in advance.
//!
//! Each member starts with a placeholder header; once the payload is done the header is
//! rewritten in place with the real size. This needs a sink that can seek, such as a regular
//! file, and lets a member's payload be compressed on the fly.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Write;
//!
//! use streamtar::{ArchiveSession, MemberMetadata};
//!
//! # fn main() -> streamtar::Result<()> {
//! let mut session = ArchiveSession::open(File::create("out.tar")?)?;
//! {
//!     let mut member = session.new_compressed_member(&MemberMetadata::new("log.txt.gz"))?;
//!     member.write_all(b"produced incrementally")?;
//!     member.close()?;
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod archive;
mod byteorder;
pub mod error;
pub mod header;

pub use archive::{
    stream_file, ArchiveSession, CompressingMemberWriter, Compressor, GzipCompressor,
    MemberMetadata, MemberSummary, StreamingMemberWriter,
};
pub use error::{ArchiveError, Result};
pub use header::{TarHeader, TypeFlag};
