//! The operation model: the tagged events a BPS patch stream is made of.

use blip_varint::{signed_varint_len, varint_len};

/// A single event in a BPS operation stream.
///
/// `Header` is always first; `SourceCrc32` then `TargetCrc32` are always
/// last. The four variants in between describe how to build up the target
/// buffer: `SourceRead`/`SourceCopy` pull from `source`, `TargetRead` appends
/// literal bytes, and `TargetCopy` repeats a span already written to the
/// target (including spans the same operation is still writing, which gives
/// run-length-encoding semantics).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
  Header { source_size: u32, target_size: u32, metadata: String },
  SourceRead { length: u32 },
  TargetRead { data: Vec<u8> },
  SourceCopy { length: u32, offset: i64 },
  TargetCopy { length: u32, offset: i64 },
  SourceCrc32(u32),
  TargetCrc32(u32),
}

impl Operation {
  /// The number of target bytes this operation produces: `length` for the
  /// four middle variants, `data.len()` for `TargetRead`, `0` for the header
  /// and the trailing checksums.
  pub fn bytespan(&self) -> u32 {
    match self {
      Operation::SourceRead { length }
      | Operation::SourceCopy { length, .. }
      | Operation::TargetCopy { length, .. } => *length,
      Operation::TargetRead { data } => data.len() as u32,
      Operation::Header { .. } | Operation::SourceCrc32(_) | Operation::TargetCrc32(_) => 0,
    }
  }

  /// The exact number of bytes this operation occupies in the binary opcode
  /// stream (excluding the header and the three footer CRCs, which the codec
  /// encodes directly rather than through this path).
  ///
  /// Since `offset` already stores the delta relative to the persistent
  /// copy cursor (the same delta the binary encoding writes), no cursor is
  /// needed here; the diff engine, which must score *candidate* offsets
  /// before committing to a cursor delta, does that costing itself in
  /// `diff::engine` against still-absolute candidate offsets.
  pub fn encoded_len(&self) -> usize {
    match self {
      Operation::SourceRead { length } => varint_len(opcode_header(0, *length)),
      Operation::TargetRead { data } => {
        varint_len(opcode_header(1, data.len() as u32)) + data.len()
      }
      Operation::SourceCopy { length, offset } => {
        varint_len(opcode_header(2, *length)) + signed_varint_len(*offset)
      }
      Operation::TargetCopy { length, offset } => {
        varint_len(opcode_header(3, *length)) + signed_varint_len(*offset)
      }
      Operation::Header { .. } | Operation::SourceCrc32(_) | Operation::TargetCrc32(_) => 0,
    }
  }
}

/// Packs a 2-bit opcode and a length (stored as `length - 1`) into the
/// leading varint of a middle operation record.
pub(crate) fn opcode_header(opcode: u8, length: u32) -> u64 {
  debug_assert!(length >= 1, "BPS operation lengths must be at least 1");
  debug_assert!(opcode < 4);
  (u64::from(length - 1) << 2) | u64::from(opcode)
}
