use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::Compression;

use super::compress::{CompressingMemberWriter, Compressor, GzipCompressor};
use super::member::StreamingMemberWriter;
use super::MemberMetadata;
use crate::align::{self, padding_for, BLOCK_SIZE, END_OF_ARCHIVE};
use crate::error::{ArchiveError, Result};
use crate::header::{TarHeader, HEADER_SIZE};

/// An archive being written to a seekable sink.
///
/// The session is the only writer to the sink while it lives. A member writer mutably borrows the
/// session, so at most one member can be in progress at any time.
#[derive(Debug)]
pub struct ArchiveSession<W: Write + Seek> {
    sink: W,
    /// Absolute position in the sink where the next byte will be written.
    offset: u64,
    /// Header offset of a member whose placeholder has not been patched yet.
    unpatched: Option<u64>,
    compression: Compression,
}

impl<W: Write + Seek> ArchiveSession<W> {
    /// Start an archive at the sink's current position. Fails with
    /// [`ArchiveError::Capability`] without writing anything when the sink can't seek.
    pub fn open(mut sink: W) -> Result<Self> {
        let offset = sink.stream_position().map_err(ArchiveError::Capability)?;
        // a successful tell doesn't guarantee a successful seek
        sink.seek(SeekFrom::Start(offset))
            .map_err(ArchiveError::Capability)?;
        log::debug!("Opened archive session at offset {}", offset);
        Ok(Self {
            sink,
            offset,
            unpatched: None,
            compression: Compression::best(),
        })
    }

    /// Gzip level (0-9) used by [`new_compressed_member`](Self::new_compressed_member).
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Where the next member's header will be written.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Start a member whose payload is written as-is.
    pub fn new_member(
        &mut self,
        metadata: &MemberMetadata,
    ) -> Result<StreamingMemberWriter<'_, W>> {
        self.ensure_idle()?;
        let mut member = StreamingMemberWriter::new(self, metadata.to_header())?;
        member.open()?;
        Ok(member)
    }

    /// Start a member whose payload is gzip-compressed on the fly.
    pub fn new_compressed_member(
        &mut self,
        metadata: &MemberMetadata,
    ) -> Result<CompressingMemberWriter<'_, W, GzipCompressor>> {
        let compressor = GzipCompressor::for_member(metadata, self.compression);
        self.new_compressed_member_with(metadata, compressor)
    }

    /// Start a member whose payload goes through `compressor`.
    pub fn new_compressed_member_with<C: Compressor>(
        &mut self,
        metadata: &MemberMetadata,
        compressor: C,
    ) -> Result<CompressingMemberWriter<'_, W, C>> {
        let member = self.new_member(metadata)?;
        Ok(CompressingMemberWriter::new(member, compressor))
    }

    /// Write the end of archive marker and hand the sink back. The sink is flushed but otherwise
    /// left open.
    pub fn close(mut self) -> Result<W> {
        self.ensure_idle()?;
        self.write_all(&END_OF_ARCHIVE)?;
        self.sink.flush()?;
        log::debug!("Closed archive session at offset {}", self.offset);
        Ok(self.sink)
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.unpatched {
            Some(header_offset) => Err(ArchiveError::state(format!(
                "member at offset {} was never closed; its header still records size 0",
                header_offset
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.sink.write_all(buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    pub(crate) fn write_padding(&mut self, byte_count: u64) -> Result<u64> {
        let padding = align::write_padding(&mut self.sink, byte_count)?;
        self.offset += padding;
        Ok(padding)
    }

    pub(crate) fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.sink.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    pub(crate) fn mark_unpatched(&mut self, header_offset: Option<u64>) {
        self.unpatched = header_offset;
    }
}

impl<W: Read + Write + Seek> ArchiveSession<W> {
    /// Reopen an existing archive for more members. The headers are walked from the start of the
    /// sink up to the end of archive marker (or the end of the sink), and the session starts
    /// there, so new members overwrite the old marker.
    pub fn append(mut sink: W) -> Result<Self> {
        let len = sink
            .seek(SeekFrom::End(0))
            .map_err(ArchiveError::Capability)?;
        sink.seek(SeekFrom::Start(0))?;
        let mut offset = 0u64;
        let mut block = [0u8; HEADER_SIZE];
        let mut members = 0;
        while read_block(&mut sink, &mut block)? {
            if block.iter().all(|&b| b == 0) {
                break;
            }
            let header = TarHeader::decode(&block)?;
            log::trace!("Skipping member {} ({} bytes)", header.name, header.size);
            offset += BLOCK_SIZE + header.size + padding_for(header.size);
            if offset > len {
                return Err(ArchiveError::format(format!(
                    "member {} runs past the end of the archive ({} > {} bytes)",
                    header.name, offset, len
                )));
            }
            sink.seek(SeekFrom::Start(offset))?;
            members += 1;
        }
        sink.seek(SeekFrom::Start(offset))?;
        log::debug!(
            "Appending to archive with {} members at offset {}",
            members,
            offset
        );
        Ok(Self {
            sink,
            offset,
            unpatched: None,
            compression: Compression::best(),
        })
    }
}

/// Fill `block` from the reader. Returns false on a clean end of input, and fails on a block cut
/// short.
fn read_block<R: Read>(reader: &mut R, block: &mut [u8; HEADER_SIZE]) -> Result<bool> {
    let mut filled = 0;
    while filled < block.len() {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(false),
        HEADER_SIZE => Ok(true),
        _ => Err(ArchiveError::format(format!(
            "archive ends inside a block ({} of {} bytes)",
            filled, HEADER_SIZE
        ))),
    }
}
