//! The binary BPS wire format: `BPS1` magic, varint-framed sizes and
//! metadata, a stream of opcode records, then three little-endian CRC32
//! trailers (source, target, patch).
//!
//! Grounded on the root package's `b"BPS1"` magic check (`src/patch/bps.rs`)
//! and on `original_source/blip/io.py`'s `read_blip`/`write_blip` for framing
//! order and the patch-CRC-excludes-itself rule.

use crate::crc::{CrcReader, CrcWriter};
use crate::ops::{opcode_header, Operation};
use blip_err::{map_decode_io_err, CorruptPatch};
use blip_varint::{write_signed_varint, write_varint, ReadVarInt};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Write};

pub const MAGIC: &[u8; 4] = b"BPS1";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
  Header,
  Body,
  SourceCrc,
  TargetCrc,
  PatchCrc,
  Done,
}

/// A lazy, pull-based decoder over a binary BPS patch stream.
///
/// Yields one [`Operation`] per call to `next`, reading only as many bytes
/// as that operation needs. Does not itself enforce cross-operation
/// invariants (cursor bounds, trailer ordering) — wrap it in
/// [`crate::validate::Validator`] for that.
pub struct Decoder<R> {
  reader: CrcReader<R>,
  phase: Phase,
  target_size: u32,
  target_write_offset: u32,
}

impl<R: Read> Decoder<R> {
  pub fn new(reader: R) -> Self {
    Self {
      reader: CrcReader::new(reader),
      phase: Phase::Header,
      target_size: 0,
      target_write_offset: 0,
    }
  }

  fn decode_header(&mut self) -> Result<Operation, CorruptPatch> {
    let mut magic = [0u8; 4];
    self.reader.read_exact(&mut magic).map_err(map_decode_io_err)?;
    if &magic != MAGIC {
      return Err(CorruptPatch::BadMagic { expected: MAGIC, found: magic.to_vec() });
    }
    let source_size = read_u32_varint(&mut self.reader)?;
    let target_size = read_u32_varint(&mut self.reader)?;
    let metadata_len = read_u32_varint(&mut self.reader)? as usize;
    let mut metadata_bytes = vec![0u8; metadata_len];
    self.reader.read_exact(&mut metadata_bytes).map_err(map_decode_io_err)?;
    let metadata = String::from_utf8(metadata_bytes).map_err(|_| CorruptPatch::MetadataNotUtf8)?;

    self.target_size = target_size;
    self.phase = Phase::Body;
    log::trace!("decoded header: source_size={source_size} target_size={target_size}");
    Ok(Operation::Header { source_size, target_size, metadata })
  }

  fn decode_body_op(&mut self) -> Result<Operation, CorruptPatch> {
    let header = self.reader.read_varint().map_err(map_decode_io_err)?;
    let opcode = (header & 0x3) as u8;
    let length = u32::try_from(header >> 2)
      .ok()
      .and_then(|n| n.checked_add(1))
      .ok_or_else(|| CorruptPatch::BadVarInt { reason: format!("operation length overflows u32: {header}") })?;

    let op = match opcode {
      0 => Operation::SourceRead { length },
      1 => {
        let mut data = vec![0u8; length as usize];
        self.reader.read_exact(&mut data).map_err(map_decode_io_err)?;
        Operation::TargetRead { data }
      }
      2 => {
        let offset = self.reader.read_signed_varint().map_err(map_decode_io_err)?;
        Operation::SourceCopy { length, offset }
      }
      3 => {
        let offset = self.reader.read_signed_varint().map_err(map_decode_io_err)?;
        Operation::TargetCopy { length, offset }
      }
      _ => unreachable!("opcode is masked to 2 bits"),
    };

    self.target_write_offset = self
      .target_write_offset
      .checked_add(op.bytespan())
      .ok_or_else(|| CorruptPatch::WriteOverflowsTarget {
        offset: u64::from(self.target_write_offset),
        length: op.bytespan(),
        target_size: self.target_size,
      })?;
    log::trace!("decoded {op:?} (target_write_offset now {})", self.target_write_offset);
    Ok(op)
  }

  fn decode_crc(&mut self) -> Result<u32, CorruptPatch> {
    let mut bytes = [0u8; 4];
    self.reader.read_exact(&mut bytes).map_err(map_decode_io_err)?;
    Ok(LittleEndian::read_u32(&bytes))
  }
}

impl<R: Read> Iterator for Decoder<R> {
  type Item = Result<Operation, CorruptPatch>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      match self.phase {
        Phase::Header => return Some(self.decode_header()),
        Phase::Body => {
          if self.target_write_offset < self.target_size {
            return Some(self.decode_body_op());
          }
          self.phase = Phase::SourceCrc;
        }
        Phase::SourceCrc => {
          self.phase = Phase::TargetCrc;
          return Some(self.decode_crc().map(Operation::SourceCrc32));
        }
        Phase::TargetCrc => {
          self.phase = Phase::PatchCrc;
          return Some(self.decode_crc().map(Operation::TargetCrc32));
        }
        Phase::PatchCrc => {
          self.phase = Phase::Done;
          let actual = self.reader.crc32();
          let mut buf = [0u8; 4];
          return match self.reader.get_mut().read_exact(&mut buf) {
            Ok(()) => {
              let expected = LittleEndian::read_u32(&buf);
              if expected == actual {
                None
              } else {
                log::warn!("patch checksum mismatch: expected {expected:08X}, computed {actual:08X}");
                Some(Err(CorruptPatch::PatchChecksumMismatch { expected, actual }))
              }
            }
            Err(err) => Some(Err(map_decode_io_err(err))),
          };
        }
        Phase::Done => return None,
      }
    }
  }
}

fn read_u32_varint<R: Read>(reader: &mut R) -> Result<u32, CorruptPatch> {
  let n = reader.read_varint().map_err(map_decode_io_err)?;
  u32::try_from(n).map_err(|_| CorruptPatch::BadVarInt { reason: format!("size field {n} overflows u32") })
}

/// Writes a validated operation stream as a binary BPS patch.
///
/// Assumes the stream is already well-formed (header first, the two
/// checksum trailers last, in order): it is a pure serializer, not a second
/// validator.
pub struct Encoder<W> {
  writer: CrcWriter<W>,
}

impl<W: Write> Encoder<W> {
  pub fn new(writer: W) -> Self {
    Self { writer: CrcWriter::new(writer) }
  }

  pub fn encode<I>(mut self, ops: I) -> Result<W, CorruptPatch>
  where
    I: IntoIterator<Item = Operation>,
  {
    let mut iter = ops.into_iter();
    let header = iter
      .next()
      .ok_or_else(|| CorruptPatch::TruncatedStream { reason: "missing header".into() })?;
    let (source_size, target_size, metadata) = match header {
      Operation::Header { source_size, target_size, metadata } => (source_size, target_size, metadata),
      _ => {
        return Err(CorruptPatch::TruncatedStream {
          reason: "stream does not start with Header".into(),
        })
      }
    };

    self.writer.write_all(MAGIC)?;
    write_varint(u64::from(source_size), &mut self.writer)?;
    write_varint(u64::from(target_size), &mut self.writer)?;
    let metadata_bytes = metadata.as_bytes();
    write_varint(metadata_bytes.len() as u64, &mut self.writer)?;
    self.writer.write_all(metadata_bytes)?;

    for op in iter {
      match op {
        Operation::SourceRead { length } => {
          write_varint(opcode_header(0, length), &mut self.writer)?;
        }
        Operation::TargetRead { data } => {
          write_varint(opcode_header(1, data.len() as u32), &mut self.writer)?;
          self.writer.write_all(&data)?;
        }
        Operation::SourceCopy { length, offset } => {
          write_varint(opcode_header(2, length), &mut self.writer)?;
          write_signed_varint(offset, &mut self.writer)?;
        }
        Operation::TargetCopy { length, offset } => {
          write_varint(opcode_header(3, length), &mut self.writer)?;
          write_signed_varint(offset, &mut self.writer)?;
        }
        Operation::SourceCrc32(v) => {
          let mut bytes = [0u8; 4];
          LittleEndian::write_u32(&mut bytes, v);
          self.writer.write_all(&bytes)?;
        }
        Operation::TargetCrc32(v) => {
          let mut bytes = [0u8; 4];
          LittleEndian::write_u32(&mut bytes, v);
          self.writer.write_all(&bytes)?;
        }
        Operation::Header { .. } => {
          return Err(CorruptPatch::DuplicateOrMisorderedTrailer {
            reason: "a second Header appeared mid-stream".into(),
          })
        }
      }
    }

    let patch_crc = self.writer.crc32();
    let mut inner = self.writer.into_inner();
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, patch_crc);
    inner.write_all(&bytes)?;
    Ok(inner)
  }
}
