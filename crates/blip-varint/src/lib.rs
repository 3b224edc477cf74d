//! The self-terminating variable-length integer encoding used by BPS patches.
//!
//! Each non-negative integer is split into little-endian 7-bit groups; the
//! final group has its high bit set. The running shift is reduced by one
//! after each group, so every additional group covers a full 128 values
//! instead of overlapping with shorter encodings of the same value.

use byteorder::ReadBytesExt;
use checked::Checked;
use std::io;
use std::io::Read;
use std::io::Write;

/// Reads a BPS-style variable-length integer from a byte stream.
pub trait ReadVarInt: Read {
  /// Decodes a single varint.
  ///
  /// # Errors
  /// Returns [`io::ErrorKind::InvalidData`] if the value overflows a `u64`.
  /// Returns whatever [`Read::read_u8`] returns if the stream ends early —
  /// typically [`io::ErrorKind::UnexpectedEof`].
  fn read_varint(&mut self) -> io::Result<u64> {
    let mut data: u64 = 0;
    let mut shift = Checked::<u64>::new(1);
    loop {
      let byte = self.read_u8()?;
      let new_value: u64 = (u64::from(byte & 0x7F) * shift + data).ok_or_else(overflow_err)?;
      if is_msb_set(byte) {
        return Ok(new_value);
      }
      // equivalent to `shift << 7`, but multiplication checks for overflow
      shift = shift * 128;
      data = (new_value + shift).ok_or_else(overflow_err)?;
    }
  }

  /// Reads a signed varint: an unsigned magnitude with the sign packed into
  /// the low bit (`0` positive, `1` negative). Zero is always positive.
  fn read_signed_varint(&mut self) -> io::Result<i64> {
    let encoded = self.read_varint()?;
    let magnitude = i64::try_from(encoded >> 1).map_err(|_| overflow_err())?;
    Ok(if encoded & 1 == 1 { -magnitude } else { magnitude })
  }
}

impl<R: Read + ?Sized> ReadVarInt for R {}

/// Encodes `n` as a BPS varint and writes it to `writer`.
pub fn write_varint(mut n: u64, writer: &mut impl Write) -> io::Result<()> {
  while n > 0x7F {
    writer.write_all(&[(n & 0x7F) as u8])?;
    n = (n >> 7) - 1;
  }
  writer.write_all(&[(n as u8) | 0x80])
}

/// Encodes a signed value the same way [`ReadVarInt::read_signed_varint`] decodes it.
pub fn write_signed_varint(n: i64, writer: &mut impl Write) -> io::Result<()> {
  let magnitude = n.unsigned_abs();
  let encoded = (magnitude << 1) | u64::from(n < 0);
  write_varint(encoded, writer)
}

/// The number of bytes [`write_varint`] would emit for `n`, without writing them.
///
/// Used by the diff engine's efficiency metric to cost candidate operations
/// without allocating a throwaway buffer.
pub fn varint_len(mut n: u64) -> usize {
  let mut len = 1;
  while n > 0x7F {
    n = (n >> 7) - 1;
    len += 1;
  }
  len
}

/// The number of bytes [`write_signed_varint`] would emit for `n`.
pub fn signed_varint_len(n: i64) -> usize {
  let magnitude = n.unsigned_abs();
  varint_len((magnitude << 1) | u64::from(n < 0))
}

fn overflow_err() -> io::Error {
  io::Error::from(io::ErrorKind::InvalidData)
}

fn is_msb_set(byte: u8) -> bool {
  byte & 0x80 == 0x80
}
