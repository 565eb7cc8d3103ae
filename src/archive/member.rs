use std::io::{self, Seek, Write};

use super::session::ArchiveSession;
use crate::error::{ArchiveError, Result};
use crate::header::{patch_size, TarHeader, HEADER_SIZE};

/// Where a member is in its lifecycle. Members only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberState {
    /// Header encoded in memory, nothing written yet.
    Created,
    /// Placeholder header written; payload may follow.
    Open,
    /// Header patched, or a close was attempted. The writer is dead either way.
    Closed,
    /// The sink failed mid-member; how much of the payload landed is unknown.
    Failed,
}

/// What a closed member ended up as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSummary {
    pub name: String,
    /// Absolute offset of the member's header block.
    pub header_offset: u64,
    /// Bytes of data recorded in the header.
    pub size: u64,
    /// Zero bytes written after the data.
    pub padding: u64,
}

/// Writes one member's payload straight to the archive, counting bytes as they go.
///
/// The header is written with size 0 when the member starts and patched on
/// [`close`](Self::close). Dropping the writer closes it too, logging any failure; a member
/// that could not be closed keeps its placeholder header and blocks the session.
pub struct StreamingMemberWriter<'a, W: Write + Seek> {
    session: &'a mut ArchiveSession<W>,
    header: TarHeader,
    placeholder: [u8; HEADER_SIZE],
    header_offset: u64,
    bytes_written: u64,
    state: MemberState,
}

impl<'a, W: Write + Seek> StreamingMemberWriter<'a, W> {
    /// Encode the placeholder header. Nothing is written, so an oversized field leaves the
    /// archive untouched.
    pub(crate) fn new(session: &'a mut ArchiveSession<W>, header: TarHeader) -> Result<Self> {
        let header = TarHeader { size: 0, ..header };
        let placeholder = header.encode()?;
        let header_offset = session.offset();
        Ok(Self {
            session,
            header,
            placeholder,
            header_offset,
            bytes_written: 0,
            state: MemberState::Created,
        })
    }

    /// Write the placeholder header at the session's current offset.
    pub(crate) fn open(&mut self) -> Result<()> {
        if self.state != MemberState::Created {
            return Err(ArchiveError::state(format!(
                "header for {} was already written",
                self.header.name
            )));
        }
        self.header_offset = self.session.offset();
        // a failed write leaves a partial header behind, so the session is blocked up front
        self.session.mark_unpatched(Some(self.header_offset));
        self.session.write_all(&self.placeholder)?;
        self.state = MemberState::Open;
        log::debug!(
            "Opened member {} at offset {}",
            self.header.name,
            self.header_offset
        );
        Ok(())
    }

    /// Append payload bytes.
    pub fn write_payload(&mut self, buf: &[u8]) -> Result<()> {
        if self.state != MemberState::Open {
            return Err(ArchiveError::state(format!(
                "member {} is not open for writing",
                self.header.name
            )));
        }
        if let Err(e) = self.session.write_all(buf) {
            // part of `buf` may already be in the sink, so the byte count can't be trusted
            self.fail();
            return Err(e);
        }
        self.bytes_written += buf.len() as u64;
        log::trace!(
            "Wrote {} bytes to {} ({} total)",
            buf.len(),
            self.header.name,
            self.bytes_written
        );
        Ok(())
    }

    /// Pad the data, rewrite the header with the real size and move past the member.
    ///
    /// Only the first call does anything; later calls fail with [`ArchiveError::State`], as do
    /// calls after a failed payload write. If this fails part way the writer is still dead, and
    /// the session stays blocked.
    pub fn close(&mut self) -> Result<MemberSummary> {
        if self.state != MemberState::Open {
            return Err(ArchiveError::state(format!(
                "member {} is not open; close happens once",
                self.header.name
            )));
        }
        self.state = MemberState::Closed;

        let padding = self.session.write_padding(self.bytes_written)?;
        let patched = patch_size(&self.placeholder, self.bytes_written)?;
        self.session.seek_to(self.header_offset)?;
        self.session.write_all(&patched)?;
        let end = self.header_offset + HEADER_SIZE as u64 + self.bytes_written + padding;
        self.session.seek_to(end)?;
        self.session.mark_unpatched(None);

        log::debug!(
            "Closed member {}: {} bytes, {} bytes padding",
            self.header.name,
            self.bytes_written,
            padding
        );
        Ok(MemberSummary {
            name: self.header.name.clone(),
            header_offset: self.header_offset,
            size: self.bytes_written,
            padding,
        })
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// Payload bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_open(&self) -> bool {
        self.state == MemberState::Open
    }

    /// Give up on the member without patching its header. The session stays blocked.
    pub(crate) fn fail(&mut self) {
        if self.state != MemberState::Closed {
            log::error!(
                "Member {} at offset {} failed; its header still records size 0",
                self.header.name,
                self.header_offset
            );
            self.state = MemberState::Failed;
        }
    }
}

impl<W: Write + Seek> Write for StreamingMemberWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_payload(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.session.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for StreamingMemberWriter<'_, W> {
    fn drop(&mut self) {
        if self.state == MemberState::Open {
            if let Err(e) = self.close() {
                log::error!(
                    "Failed to close member {} at offset {}; its header still records size 0: {}",
                    self.header.name,
                    self.header_offset,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::{Cursor, SeekFrom};
    use std::rc::Rc;

    use super::*;
    use crate::align::{padding_for, BLOCK_SIZE};
    use crate::archive::MemberMetadata;

    /// Accepts `budget` more bytes, then fails the next write once.
    #[derive(Debug)]
    struct DiskFullSink {
        inner: Cursor<Vec<u8>>,
        budget: Rc<Cell<Option<usize>>>,
    }

    impl Write for DiskFullSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.budget.get() {
                Some(0) => {
                    self.budget.set(None);
                    Err(io::Error::other("no space left on device"))
                }
                Some(n) => {
                    let len = n.min(buf.len());
                    self.budget.set(Some(n - len));
                    self.inner.write(&buf[..len])
                }
                None => self.inner.write(buf),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for DiskFullSink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn write_member(payload: &[u8]) -> anyhow::Result<(MemberSummary, Vec<u8>)> {
        let mut session = ArchiveSession::open(Cursor::new(Vec::new()))?;
        let summary = {
            let mut member = session.new_member(&MemberMetadata::new("payload.bin"))?;
            // uneven chunks
            for chunk in payload.chunks(333) {
                member.write_payload(chunk)?;
            }
            member.close()?
        };
        Ok((summary, session.close()?.into_inner()))
    }

    #[test]
    fn test_recorded_size_matches_payload() -> anyhow::Result<()> {
        for len in [0usize, 1, 380, 511, 512, 513, 1055, 9999, 10240] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
            let (summary, bytes) = write_member(&payload)?;
            let n = len as u64;

            let header = TarHeader::decode(&bytes[..HEADER_SIZE])?;
            assert_eq!(header.size, n);
            assert_eq!(summary.size, n);
            assert_eq!(summary.padding, padding_for(n));
            assert_eq!((n + summary.padding) % BLOCK_SIZE, 0);

            let member_len = HEADER_SIZE as u64 + n + padding_for(n);
            assert_eq!(bytes.len() as u64, member_len + 1024);
            assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + len], &payload[..]);
            assert!(bytes[HEADER_SIZE + len..].iter().all(|&b| b == 0));
        }
        Ok(())
    }

    #[test]
    fn test_consecutive_members() -> anyhow::Result<()> {
        let mut session = ArchiveSession::open(Cursor::new(Vec::new()))?;
        let first = {
            let mut member = session.new_member(&MemberMetadata::new("a"))?;
            member.write_all(&[7u8; 1000])?;
            member.close()?
        };
        let second = session.new_member(&MemberMetadata::new("b"))?;
        assert_eq!(
            second.header_offset(),
            first.header_offset + HEADER_SIZE as u64 + first.size + first.padding
        );
        assert_eq!(second.header_offset(), 512 + 1024);
        Ok(())
    }

    #[test]
    fn test_write_after_close_fails() -> anyhow::Result<()> {
        let mut session = ArchiveSession::open(Cursor::new(Vec::new()))?;
        let mut member = session.new_member(&MemberMetadata::new("done"))?;
        member.write_payload(b"data")?;
        member.close()?;
        assert!(!member.is_open());

        assert!(matches!(
            member.write_payload(b"more"),
            Err(ArchiveError::State(_))
        ));
        assert!(member.write(b"more").is_err());
        assert!(matches!(member.close(), Err(ArchiveError::State(_))));
        assert!(matches!(member.open(), Err(ArchiveError::State(_))));
        assert_eq!(member.bytes_written(), 4);
        Ok(())
    }

    #[test]
    fn test_second_close_does_not_touch_the_sink() -> anyhow::Result<()> {
        let mut session = ArchiveSession::open(Cursor::new(Vec::new()))?;
        {
            let mut member = session.new_member(&MemberMetadata::new("once"))?;
            member.write_payload(b"x")?;
            member.close()?;
            assert!(member.close().is_err());
        }
        assert_eq!(session.offset(), 1024);
        Ok(())
    }

    #[test]
    fn test_drop_closes_the_member() -> anyhow::Result<()> {
        let mut session = ArchiveSession::open(Cursor::new(Vec::new()))?;
        {
            let mut member = session.new_member(&MemberMetadata::new("dropped"))?;
            io::copy(&mut &b"scoped close"[..], &mut member)?;
        }
        let bytes = session.close()?.into_inner();
        let header = TarHeader::decode(&bytes[..HEADER_SIZE])?;
        assert_eq!(header.name, "dropped");
        assert_eq!(header.size, 12);
        Ok(())
    }

    #[test]
    fn test_short_write_kills_the_member() -> anyhow::Result<()> {
        let budget = Rc::new(Cell::new(None));
        let sink = DiskFullSink {
            inner: Cursor::new(Vec::new()),
            budget: Rc::clone(&budget),
        };
        let mut session = ArchiveSession::open(sink)?;
        {
            let mut member = session.new_member(&MemberMetadata::new("partial"))?;
            budget.set(Some(4));
            assert!(matches!(
                member.write_payload(b"ABCDEFGH"),
                Err(ArchiveError::Io(_))
            ));
            // the sink has recovered, but four bytes of the chunk are already in it
            assert!(matches!(
                member.write_payload(b"ABCDEFGH"),
                Err(ArchiveError::State(_))
            ));
            assert!(matches!(member.close(), Err(ArchiveError::State(_))));
            assert!(!member.is_open());
        }
        // dropping the failed member must not patch its header
        assert_eq!(session.offset(), HEADER_SIZE as u64);
        assert!(matches!(
            session.new_member(&MemberMetadata::new("next")),
            Err(ArchiveError::State(_))
        ));
        assert!(matches!(session.close(), Err(ArchiveError::State(_))));
        Ok(())
    }
}
