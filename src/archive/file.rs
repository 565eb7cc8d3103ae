//! Utility functions for buffered file operations

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::error::Result;

/// Read in 8KB of buffer for efficient reading, for large files.
const READ_BUFFER_SIZE: usize = 8192;

/// Copy the file at `path` into `writer` in chunks, without knowing its size up front. Returns the
/// number of bytes read.
pub fn stream_file<W: Write>(path: &Path, writer: &mut W) -> Result<u64> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut total_bytes_read: u64 = 0;
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        log::trace!("Read {} bytes of data..", bytes_read);
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        total_bytes_read += bytes_read as u64;
    }
    log::debug!(
        "Streamed {}. Total bytes read: {}",
        path.display(),
        total_bytes_read
    );
    Ok(total_bytes_read)
}
