use std::io::{self, Seek, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};

use super::member::{MemberSummary, StreamingMemberWriter};
use super::MemberMetadata;
use crate::error::{ArchiveError, Result};

/// A byte transform sitting in front of a member's payload.
///
/// The member records the total length of everything returned from `feed` and `finish`, which in
/// general differs from the input length.
pub trait Compressor {
    /// Consume input, returning whatever output is ready (possibly nothing).
    fn feed(&mut self, input: &[u8]) -> io::Result<Vec<u8>>;

    /// Flush buffered state and any trailer.
    fn finish(self) -> io::Result<Vec<u8>>;
}

/// Gzip, with the gzip header naming the original file.
pub struct GzipCompressor {
    encoder: GzEncoder<Vec<u8>>,
}

impl GzipCompressor {
    /// The gzip header only holds a 32-bit mtime; later times are recorded as 0 ("unknown").
    pub fn new(level: Compression, filename: Option<&str>, mtime: u64) -> Self {
        let gzip_mtime = u32::try_from(mtime).unwrap_or_else(|_| {
            log::debug!("mtime {} does not fit the gzip header; recording 0", mtime);
            0
        });
        let mut builder = GzBuilder::new().mtime(gzip_mtime);
        if let Some(filename) = filename.filter(|f| !f.is_empty() && !f.contains('\0')) {
            builder = builder.filename(filename);
        }
        Self {
            encoder: builder.write(Vec::new(), level),
        }
    }

    /// Name the gzip stream after the member: its base name without a `.gz` suffix.
    pub fn for_member(metadata: &MemberMetadata, level: Compression) -> Self {
        let base = Path::new(&metadata.name)
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.strip_suffix(".gz").unwrap_or(name));
        Self::new(level, base, metadata.mtime)
    }
}

impl Compressor for GzipCompressor {
    fn feed(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        self.encoder.write_all(input)?;
        Ok(std::mem::take(self.encoder.get_mut()))
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        self.encoder.finish()
    }
}

/// A member whose payload is compressed before it reaches the archive. The header records the
/// compressed length.
pub struct CompressingMemberWriter<'a, W: Write + Seek, C: Compressor> {
    inner: StreamingMemberWriter<'a, W>,
    /// Taken on close.
    compressor: Option<C>,
    bytes_in: u64,
}

impl<'a, W: Write + Seek, C: Compressor> CompressingMemberWriter<'a, W, C> {
    pub(crate) fn new(inner: StreamingMemberWriter<'a, W>, compressor: C) -> Self {
        Self {
            inner,
            compressor: Some(compressor),
            bytes_in: 0,
        }
    }

    /// Compress `input` and forward whatever output the compressor releases.
    pub fn write_payload(&mut self, input: &[u8]) -> Result<()> {
        let compressor = self.compressor.as_mut().ok_or_else(|| {
            ArchiveError::state(format!(
                "compressed member {} is not open for writing",
                self.inner.name()
            ))
        })?;
        let output = match compressor.feed(input) {
            Ok(output) => output,
            Err(e) => {
                self.compressor = None;
                self.inner.fail();
                return Err(e.into());
            }
        };
        self.bytes_in += input.len() as u64;
        if !output.is_empty() {
            if let Err(e) = self.inner.write_payload(&output) {
                // the inner member is dead; a trailer now would have nowhere to go
                self.compressor = None;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Finish the compressor, write its trailing output and close the member.
    pub fn close(&mut self) -> Result<MemberSummary> {
        let compressor = self.compressor.take().ok_or_else(|| {
            ArchiveError::state(format!(
                "compressed member {} is not open; close happens once",
                self.inner.name()
            ))
        })?;
        let tail = match compressor.finish() {
            Ok(tail) => tail,
            Err(e) => {
                // patching the header now would publish a truncated stream as a valid member
                self.inner.fail();
                return Err(e.into());
            }
        };
        if !tail.is_empty() {
            self.inner.write_payload(&tail)?;
        }
        log::debug!(
            "Compressed member {}: {} bytes in, {} bytes out",
            self.inner.name(),
            self.bytes_in,
            self.inner.bytes_written()
        );
        self.inner.close()
    }

    /// Uncompressed bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Compressed bytes written to the archive so far.
    pub fn bytes_out(&self) -> u64 {
        self.inner.bytes_written()
    }

    pub fn header_offset(&self) -> u64 {
        self.inner.header_offset()
    }
}

impl<W: Write + Seek, C: Compressor> Write for CompressingMemberWriter<'_, W, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_payload(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Seek, C: Compressor> Drop for CompressingMemberWriter<'_, W, C> {
    // runs before `inner` is dropped, so the compressor trailer lands inside the member
    fn drop(&mut self) {
        if self.compressor.is_some() {
            if let Err(e) = self.close() {
                log::error!(
                    "Failed to close compressed member {}: {}",
                    self.inner.name(),
                    e
                );
            }
        }
    }
}
