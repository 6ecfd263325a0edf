//! Terminated text in native memory.

use crate::error::CallError;
use bindweave_alloc::ThreadFrame;
use bindweave_meta::Charset;
use std::slice;

/// Number of code units `text` occupies once encoded, without the terminator.
pub(crate) fn unit_count(charset: Charset, text: &str) -> Result<usize, CallError> {
    Ok(match charset {
        Charset::Utf8 => text.len(),
        Charset::Utf16le => text.encode_utf16().count(),
        Charset::Latin1 => charset.encode(text)?.len(),
    })
}

/// Encodes `text` into a zeroed frame buffer of at least `capacity` units
/// plus the terminator. Returns the buffer address and its size in bytes.
pub(crate) fn encode(
    frame: &ThreadFrame,
    charset: Charset,
    text: &str,
    capacity: Option<usize>,
) -> Result<(usize, usize), CallError> {
    let unit = charset.unit_width();
    let bytes = charset.encode(text)?;
    let size = bytes.len().max(capacity.unwrap_or(0) * unit) + unit;
    let address = frame.calloc(size, unit)?;
    // SAFETY: the buffer was just allocated with room for `bytes` and a terminator.
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len()) };
    Ok((address, size))
}

/// Decodes the text at `address` up to its terminator, reading at most
/// `limit` units when a limit is known.
///
/// # Safety
///
/// `address` must point to readable memory holding a terminated string, or
/// at least `limit` readable units.
pub(crate) unsafe fn decode(charset: Charset, address: usize, limit: Option<usize>) -> Result<String, CallError> {
    let unit = charset.unit_width();
    let mut units = 0;
    while limit.map_or(true, |max| units < max) {
        let at = slice::from_raw_parts((address + units * unit) as *const u8, unit);
        if at.iter().all(|&b| b == 0) {
            break;
        }
        units += 1;
    }
    let bytes = slice::from_raw_parts(address as *const u8, units * unit);
    Ok(charset.decode(bytes)?)
}
