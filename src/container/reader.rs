//! Bounds-checked big-endian reader over a borrowed byte buffer.
//!
//! Every multi-byte read validates the remaining length first and fails with
//! [`PlayerError::CorruptInput`] instead of reading past the buffer.

use crate::{PlayerError, Result};
use nom::bytes::complete::take_till;
use nom::number::complete::be_u32;

type NomError<'a> = nom::error::Error<&'a [u8]>;

/// Cursor over a byte slice with absolute positioning.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Current absolute position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute offset. Seeking exactly to the end is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(PlayerError::CorruptInput(format!(
                "offset {offset} lies outside a {}-byte buffer",
                self.data.len()
            )));
        }
        self.pos = offset;
        Ok(())
    }

    /// Read a big-endian u32 and advance.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let (rest, value) = be_u32::<_, NomError<'a>>(&self.data[self.pos..]).map_err(|_| {
            PlayerError::CorruptInput(format!(
                "truncated 32-bit field at offset {} ({} bytes available)",
                self.pos,
                self.data.len() - self.pos
            ))
        })?;
        self.pos = self.data.len() - rest.len();
        Ok(value)
    }

    /// Read a NUL-terminated string; the buffer end also terminates it.
    ///
    /// The terminator is consumed when present.
    pub fn read_c_string(&mut self) -> Result<String> {
        let (rest, raw) = take_till::<_, _, NomError<'a>>(|b: u8| b == 0)(&self.data[self.pos..])
            .map_err(|_| {
                PlayerError::CorruptInput(format!("unreadable string at offset {}", self.pos))
            })?;
        self.pos = self.data.len() - rest.len();
        if !rest.is_empty() {
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Borrow `len` bytes starting at absolute `offset` without moving the cursor.
    pub fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or_else(|| {
            PlayerError::CorruptInput(format!("range {offset}+{len} overflows"))
        })?;
        self.data.get(offset..end).ok_or_else(|| {
            PlayerError::CorruptInput(format!(
                "range [{offset}, {end}) lies outside a {}-byte buffer",
                self.data.len()
            ))
        })
    }
}
