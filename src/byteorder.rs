//! Functions to convert Rust values into the fixed-width ASCII fields of a tar header block,
//! and back.

use std::str;

use crate::error::{ArchiveError, Result};

/// Flag bit marking a numeric field as GNU base-256 instead of octal ASCII.
const BASE256_FLAG: u8 = 0x80;

// write `value` as zero-padded octal digits followed by a NUL. Values that don't fit the octal
// digits fall back to base-256.
pub fn u64_to_octal(field: &'static str, value: u64, dst: &mut [u8]) -> Result<()> {
    let digits = dst.len() - 1;
    let encoded = format!("{:0width$o}", value, width = digits);
    if encoded.len() > digits {
        return u64_to_base256(field, value, dst);
    }
    dst[..digits].copy_from_slice(encoded.as_bytes());
    dst[digits] = 0;
    Ok(())
}

// GNU extension: first byte carries the flag, the remaining bytes hold the value big-endian.
fn u64_to_base256(field: &'static str, value: u64, dst: &mut [u8]) -> Result<()> {
    let width = dst.len() - 1;
    if width < 8 && value >> (8 * width) != 0 {
        return Err(ArchiveError::encoding(
            field,
            format!("value {} does not fit a {}-byte field", value, dst.len()),
        ));
    }
    dst.fill(0);
    dst[0] = BASE256_FLAG;
    let bytes = value.to_be_bytes();
    let len = width.min(bytes.len());
    let end = dst.len();
    dst[end - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    Ok(())
}

/// Parse a numeric field, accepting both octal ASCII and base-256.
pub fn bytes_to_u64(field: &'static str, src: &[u8]) -> Result<u64> {
    match src.first() {
        Some(first) if first & BASE256_FLAG != 0 => {
            let mut value = u64::from(first & !BASE256_FLAG);
            for &byte in &src[1..] {
                value = value
                    .checked_mul(256)
                    .and_then(|v| v.checked_add(u64::from(byte)))
                    .ok_or_else(|| {
                        ArchiveError::format(format!("field `{}` overflows u64", field))
                    })?;
            }
            Ok(value)
        }
        _ => octal_to_u64(field, src),
    }
}

fn octal_to_u64(field: &'static str, src: &[u8]) -> Result<u64> {
    // leading spaces are allowed by old writers; NUL or space terminates the digits
    let digits = src
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|&&b| b != 0 && b != b' ');
    let mut value: u64 = 0;
    for &byte in digits {
        if !(b'0'..=b'7').contains(&byte) {
            return Err(ArchiveError::format(format!(
                "field `{}` is not valid octal: {:?}",
                field,
                String::from_utf8_lossy(src)
            )));
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(byte - b'0')))
            .ok_or_else(|| ArchiveError::format(format!("field `{}` overflows u64", field)))?;
    }
    Ok(value)
}

/// Copy `value` into a NUL-padded field. A value filling the field exactly is stored without a
/// terminator, as USTAR allows.
pub fn str_to_bytes(field: &'static str, value: &str, dst: &mut [u8]) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > dst.len() {
        return Err(ArchiveError::encoding(
            field,
            format!("{} bytes exceeds the {}-byte field", bytes.len(), dst.len()),
        ));
    }
    if bytes.contains(&0) {
        return Err(ArchiveError::encoding(field, "contains a NUL byte"));
    }
    dst.fill(0);
    dst[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

pub fn bytes_to_string(field: &'static str, src: &[u8]) -> Result<String> {
    // Find the first null terminator (0u8) to handle null-padded strings
    let valid_length = src.iter().position(|&byte| byte == 0).unwrap_or(src.len());
    str::from_utf8(&src[..valid_length])
        .map(str::to_owned)
        .map_err(|e| ArchiveError::format(format!("field `{}` is not UTF-8: {}", field, e)))
}
