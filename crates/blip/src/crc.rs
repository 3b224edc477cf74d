//! CRC32-tracking wrappers around `Read`/`Write`.
//!
//! Grounded on the root package's `Crc32` newtype (`src/crc.rs`) for the
//! tracked-hash shape and on `crates/read-write-utils/src/io_utils/append.rs`'s
//! `AppendOnly<W>` for the "never seek" trick: neither wrapper implements
//! `Seek`, so a stream that must be read or written strictly once, in order,
//! simply has no way to violate that.

use std::io::{self, Read, Write};

/// Wraps a reader, maintaining a running CRC32 of every byte read through it.
pub struct CrcReader<R> {
  inner: R,
  hasher: crc32fast::Hasher,
}

impl<R> CrcReader<R> {
  pub fn new(inner: R) -> Self {
    Self { inner, hasher: crc32fast::Hasher::new() }
  }

  /// The CRC32 of every byte read through this wrapper so far.
  pub fn crc32(&self) -> u32 {
    self.hasher.clone().finalize()
  }

  /// Reads directly from the wrapped stream, bypassing the hasher. Used to
  /// consume a trailing checksum field that must not count towards itself.
  pub fn get_mut(&mut self) -> &mut R {
    &mut self.inner
  }
}

impl<R: Read> Read for CrcReader<R> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let n = self.inner.read(buf)?;
    self.hasher.update(&buf[..n]);
    Ok(n)
  }
}

/// Wraps a writer, maintaining a running CRC32 of every byte written through it.
pub struct CrcWriter<W> {
  inner: W,
  hasher: crc32fast::Hasher,
}

impl<W> CrcWriter<W> {
  pub fn new(inner: W) -> Self {
    Self { inner, hasher: crc32fast::Hasher::new() }
  }

  pub fn crc32(&self) -> u32 {
    self.hasher.clone().finalize()
  }

  pub fn into_inner(self) -> W {
    self.inner
  }
}

impl<W: Write> Write for CrcWriter<W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let n = self.inner.write(buf)?;
    self.hasher.update(&buf[..n]);
    Ok(n)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.inner.flush()
  }
}

impl CrcWriter<Vec<u8>> {
  /// Truncates the underlying buffer.
  ///
  /// Only truncation to the current length (a no-op) or to zero (which also
  /// resets the running CRC) is supported; anything else is rejected the same
  /// way a non-seekable stream rejects a seek.
  pub fn truncate(&mut self, to: u64) -> Result<(), blip_err::CorruptPatch> {
    let current = self.inner.len() as u64;
    if to == current {
      return Ok(());
    }
    if to == 0 {
      self.inner.clear();
      self.hasher = crc32fast::Hasher::new();
      return Ok(());
    }
    Err(blip_err::CorruptPatch::UnsupportedOperation {
      reason: format!("cannot truncate to {to}; only 0 or the current length ({current}) are supported"),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn reader_matches_crc32fast_directly() {
    let data = b"hello blip";
    let mut reader = CrcReader::new(Cursor::new(&data[..]));
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(reader.crc32(), crc32fast::hash(data));
  }

  #[test]
  fn writer_matches_crc32fast_directly() {
    let data = b"hello blip";
    let mut writer = CrcWriter::new(Vec::new());
    writer.write_all(data).unwrap();
    assert_eq!(writer.crc32(), crc32fast::hash(data));
  }

  #[test]
  fn get_mut_bypasses_the_hasher() {
    let mut reader = CrcReader::new(Cursor::new(vec![1u8, 2, 3]));
    let mut buf = [0u8; 1];
    reader.get_mut().read_exact(&mut buf).unwrap();
    assert_eq!(reader.crc32(), crc32fast::hash(&[]));
  }

  #[test]
  fn truncate_to_zero_resets_crc() {
    let mut writer = CrcWriter::new(Vec::new());
    writer.write_all(b"data").unwrap();
    writer.truncate(0).unwrap();
    assert_eq!(writer.crc32(), crc32fast::hash(b""));
    assert!(writer.into_inner().is_empty());
  }

  #[test]
  fn truncate_to_current_length_is_a_no_op() {
    let mut writer = CrcWriter::new(Vec::new());
    writer.write_all(b"data").unwrap();
    let before = writer.crc32();
    writer.truncate(4).unwrap();
    assert_eq!(writer.crc32(), before);
  }

  #[test]
  fn truncate_to_other_length_is_unsupported() {
    let mut writer = CrcWriter::new(Vec::new());
    writer.write_all(b"data").unwrap();
    assert!(writer.truncate(2).is_err());
  }
}
