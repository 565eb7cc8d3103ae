//! Block alignment for member data.

use std::io::Write;

use crate::error::Result;

/// Every header and every data region occupies a whole number of blocks.
pub const BLOCK_SIZE: u64 = 512;

/// End of archive (EOA) marker: two zero blocks.
pub const END_OF_ARCHIVE: [u8; 2 * BLOCK_SIZE as usize] = [0; 2 * BLOCK_SIZE as usize];

const ZERO_BLOCK: [u8; BLOCK_SIZE as usize] = [0; BLOCK_SIZE as usize];

/// Zero bytes needed after `byte_count` bytes of data to reach the next block boundary. An empty
/// member has no data blocks at all, so it needs no padding.
pub fn padding_for(byte_count: u64) -> u64 {
    match byte_count % BLOCK_SIZE {
        0 => 0,
        rem => BLOCK_SIZE - rem,
    }
}

/// Write `padding_for(byte_count)` zero bytes, returning how many were written.
pub fn write_padding<W: Write>(writer: &mut W, byte_count: u64) -> Result<u64> {
    let padding = padding_for(byte_count);
    // padding is always shorter than one block
    writer.write_all(&ZERO_BLOCK[..padding as usize])?;
    Ok(padding)
}
