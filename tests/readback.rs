//! Archives written here must be readable by an independent tar implementation.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use flate2::read::GzDecoder;
use streamtar::{ArchiveSession, MemberMetadata};

struct Entry {
    name: &'static str,
    len: usize,
    mtime: u64,
    compressed: bool,
}

const ENTRIES: &[Entry] = &[
    Entry {
        name: "medium",
        len: 9999,
        mtime: 1492000015,
        compressed: true,
    },
    Entry {
        name: "emptyfile",
        len: 0,
        mtime: 1492000030,
        compressed: true,
    },
    Entry {
        name: "smaller",
        len: 380,
        mtime: 1492000045,
        compressed: false,
    },
    Entry {
        name: "biggy",
        len: 49999,
        mtime: 1492000060,
        compressed: true,
    },
    Entry {
        name: "little",
        len: 1055,
        mtime: 1492010015,
        compressed: false,
    },
    Entry {
        name: "emptiness",
        len: 0,
        mtime: 1492010030,
        compressed: false,
    },
    Entry {
        name: "large",
        len: 10240,
        mtime: 1492010060,
        compressed: true,
    },
    Entry {
        name: "one-byter",
        len: 1,
        mtime: 1492010045,
        compressed: false,
    },
];

fn payload(entry: &Entry) -> Vec<u8> {
    // deterministic but not trivially compressible
    let mut state = entry.mtime as u32;
    (0..entry.len)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            b'a' + ((state >> 16) % 26) as u8
        })
        .collect()
}

fn member_name(entry: &Entry) -> String {
    if entry.compressed {
        format!("{}.gz", entry.name)
    } else {
        entry.name.to_string()
    }
}

fn add_entries<W: Write + Seek>(
    session: &mut ArchiveSession<W>,
    entries: &[Entry],
) -> anyhow::Result<()> {
    for entry in entries {
        let metadata = MemberMetadata::new(member_name(entry))
            .mode(0o640)
            .owner(1000, 1000)
            .mtime(entry.mtime);
        let data = payload(entry);
        if entry.compressed {
            let mut member = session.new_compressed_member(&metadata)?;
            for chunk in data.chunks(1000) {
                member.write_all(chunk)?;
            }
            member.close()?;
        } else {
            let mut member = session.new_member(&metadata)?;
            member.write_all(&data)?;
            member.close()?;
        }
    }
    Ok(())
}

/// Read the whole archive back and compare it against `ENTRIES`.
fn assert_archive_holds_entries(mut file: File) -> anyhow::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    let mut archive = tar::Archive::new(file);
    let mut seen = 0;
    for (entry, expected) in archive.entries()?.zip(ENTRIES) {
        let mut entry = entry?;
        let header = entry.header();
        assert_eq!(entry.path()?.to_str(), Some(member_name(expected).as_str()));
        assert_eq!(header.mtime()?, expected.mtime);
        assert_eq!(header.mode()?, 0o640);
        assert_eq!(header.uid()?, 1000);

        let mut stored = Vec::new();
        entry.read_to_end(&mut stored)?;
        assert_eq!(stored.len() as u64, entry.header().size()?);

        let content = if expected.compressed {
            let mut decoded = Vec::new();
            GzDecoder::new(&stored[..]).read_to_end(&mut decoded)?;
            decoded
        } else {
            stored
        };
        assert_eq!(content, payload(expected), "content of {}", expected.name);
        seen += 1;
    }
    assert_eq!(seen, ENTRIES.len());
    Ok(())
}

#[test]
fn test_readback_with_tar_crate() -> anyhow::Result<()> {
    let mut file = tempfile::tempfile()?;
    let mut session = ArchiveSession::open(&mut file)?;
    add_entries(&mut session, ENTRIES)?;
    session.close()?;

    assert_archive_holds_entries(file)
}

#[test]
fn test_closed_archive_can_be_appended_to() -> anyhow::Result<()> {
    let mut file = tempfile::tempfile()?;
    let mut session = ArchiveSession::open(&mut file)?;
    add_entries(&mut session, &ENTRIES[..3])?;
    session.close()?;

    let mut session = ArchiveSession::append(&mut file)?;
    add_entries(&mut session, &ENTRIES[3..])?;
    session.close()?;

    assert_archive_holds_entries(file)
}

#[test]
fn test_unterminated_archive_can_be_continued() -> anyhow::Result<()> {
    let mut file = tempfile::tempfile()?;
    {
        let mut session = ArchiveSession::open(&mut file)?;
        let mut member = session.new_member(&MemberMetadata::new("first").mtime(1))?;
        member.write_all(b"first member")?;
        member.close()?;
        drop(member);
        // no terminator yet; a second session picks up where this one stopped
        let offset = session.offset();
        assert_eq!(offset, 1024);
    }
    let end = file.stream_position()?;
    assert_eq!(end, 1024);
    {
        let mut session = ArchiveSession::open(&mut file)?;
        let mut member = session.new_member(&MemberMetadata::new("second").mtime(2))?;
        member.write_all(b"second member")?;
        member.close()?;
        drop(member);
        session.close()?;
    }

    file.seek(SeekFrom::Start(0))?;
    let mut archive = tar::Archive::new(file);
    let names = archive
        .entries()?
        .map(|entry| Ok(entry?.path()?.to_string_lossy().into_owned()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    assert_eq!(names, ["first", "second"]);
    Ok(())
}

#[test]
fn test_pipe_is_rejected() -> anyhow::Result<()> {
    let (reader, writer) = nix::unistd::pipe()?;
    let err = ArchiveSession::open(File::from(writer)).unwrap_err();
    assert!(matches!(err, streamtar::ArchiveError::Capability(_)));
    drop(reader);
    Ok(())
}
