//! Applies a validated operation stream to a source buffer, producing a
//! target buffer.
//!
//! Grounded on `crates/rompatcher/src/patch/bps.rs`'s `apply_patch` for the
//! cursor bookkeeping (`sourceRelativeOffset`/`targetRelativeOffset` advance
//! by a signed delta, then by `length`). Since the core operates on
//! in-memory slices rather than a `Seek`-able file, the self-overlapping
//! `TargetCopy` case needs none of the teacher's chunked
//! `target_copy_buffer`/`RepeatSlice` machinery: copying one byte at a time
//! from `target[read_cursor]` into `target[target_write_offset]`, advancing
//! both cursors together, reproduces the same run-length behavior directly.

use crate::ops::Operation;
use blip_err::CorruptPatch;

/// Applies `ops` (expected to start with `Header` and end with the two CRC32
/// trailers) to `source`, writing the result into `target`.
///
/// `target` must already be sized to the header's `target_size`. Assumes the
/// stream has already passed through [`crate::validate::Validator`]; it does
/// not re-check cursor or bounds invariants itself. Does check the trailing
/// `SourceCrc32`/`TargetCrc32` against the actual CRC32 of `source` and the
/// reconstructed `target`, since only the applier — not the validator, which
/// never sees real buffer contents — is in a position to do so.
pub fn apply_into<I>(ops: I, source: &[u8], target: &mut [u8]) -> Result<(), CorruptPatch>
where
  I: IntoIterator<Item = Result<Operation, CorruptPatch>>,
{
  let mut ops = ops.into_iter();
  let header = ops
    .next()
    .ok_or_else(|| CorruptPatch::TruncatedStream { reason: "missing header".into() })??;
  let (source_size, target_size) = match header {
    Operation::Header { source_size, target_size, .. } => (source_size, target_size),
    _ => {
      return Err(CorruptPatch::TruncatedStream {
        reason: "stream does not start with Header".into(),
      })
    }
  };

  if (source.len() as u64) < u64::from(source_size) {
    return Err(CorruptPatch::ReadPastSource { offset: 0, length: source_size });
  }
  if target.len() != target_size as usize {
    return Err(CorruptPatch::WriteOverflowsTarget { offset: 0, length: target_size, target_size });
  }

  let mut target_write_offset: usize = 0;
  let mut source_copy_cursor: i64 = 0;
  let mut target_copy_cursor: i64 = 0;
  let mut expected_source_crc32: Option<u32> = None;
  let mut expected_target_crc32: Option<u32> = None;

  for op in ops {
    match op? {
      Operation::SourceRead { length } => {
        let length = length as usize;
        let end = target_write_offset + length;
        target[target_write_offset..end].copy_from_slice(&source[target_write_offset..end]);
        target_write_offset = end;
      }
      Operation::TargetRead { data } => {
        let end = target_write_offset + data.len();
        target[target_write_offset..end].copy_from_slice(&data);
        target_write_offset = end;
      }
      Operation::SourceCopy { length, offset } => {
        source_copy_cursor += offset;
        let start = source_copy_cursor as usize;
        let length = length as usize;
        let end = target_write_offset + length;
        target[target_write_offset..end].copy_from_slice(&source[start..start + length]);
        target_write_offset = end;
        source_copy_cursor += length as i64;
      }
      Operation::TargetCopy { length, offset } => {
        target_copy_cursor += offset;
        let mut read_cursor = target_copy_cursor as usize;
        for _ in 0..length {
          target[target_write_offset] = target[read_cursor];
          target_write_offset += 1;
          read_cursor += 1;
        }
        target_copy_cursor += i64::from(length);
      }
      Operation::SourceCrc32(crc) => expected_source_crc32 = Some(crc),
      Operation::TargetCrc32(crc) => expected_target_crc32 = Some(crc),
      Operation::Header { .. } => {}
    }
  }

  if let Some(expected) = expected_source_crc32 {
    let actual = crc32fast::hash(&source[..source_size as usize]);
    if actual != expected {
      return Err(CorruptPatch::SourceChecksumMismatch { expected, actual });
    }
  }
  if let Some(expected) = expected_target_crc32 {
    let actual = crc32fast::hash(target);
    if actual != expected {
      return Err(CorruptPatch::TargetChecksumMismatch { expected, actual });
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Appends correct trailing checksums for `source`/`expected_target` so
  /// tests exercising unrelated behavior don't trip the CRC check.
  fn with_crcs(mut ops: Vec<Operation>, source: &[u8], expected_target: &[u8]) -> Vec<Operation> {
    ops.push(Operation::SourceCrc32(crc32fast::hash(source)));
    ops.push(Operation::TargetCrc32(crc32fast::hash(expected_target)));
    ops
  }

  fn run(ops: Vec<Operation>, source: &[u8], target_len: usize) -> Vec<u8> {
    let mut target = vec![0u8; target_len];
    apply_into(ops.into_iter().map(Ok), source, &mut target).unwrap();
    target
  }

  #[test]
  fn source_read_copies_the_prefix() {
    let ops = with_crcs(
      vec![
        Operation::Header { source_size: 4, target_size: 4, metadata: String::new() },
        Operation::SourceRead { length: 4 },
      ],
      b"abcd",
      b"abcd",
    );
    assert_eq!(run(ops, b"abcd", 4), b"abcd");
  }

  #[test]
  fn target_read_writes_literal_bytes() {
    let ops = with_crcs(
      vec![
        Operation::Header { source_size: 0, target_size: 3, metadata: String::new() },
        Operation::TargetRead { data: vec![1, 2, 3] },
      ],
      b"",
      &[1, 2, 3],
    );
    assert_eq!(run(ops, b"", 3), vec![1, 2, 3]);
  }

  #[test]
  fn source_copy_honors_the_signed_delta() {
    let ops = with_crcs(
      vec![
        Operation::Header { source_size: 6, target_size: 3, metadata: String::new() },
        Operation::SourceCopy { length: 3, offset: 3 },
      ],
      b"abcdef",
      b"def",
    );
    assert_eq!(run(ops, b"abcdef", 3), b"def");
  }

  #[test]
  fn target_copy_can_overlap_its_own_output_for_run_length_repeats() {
    let ops = with_crcs(
      vec![
        Operation::Header { source_size: 0, target_size: 6, metadata: String::new() },
        Operation::TargetRead { data: vec![b'x'] },
        Operation::TargetCopy { length: 5, offset: -1 },
      ],
      b"",
      b"xxxxxx",
    );
    assert_eq!(run(ops, b"", 6), b"xxxxxx");
  }

  #[test]
  fn rejects_a_source_checksum_mismatch() {
    let ops = vec![
      Operation::Header { source_size: 4, target_size: 4, metadata: String::new() },
      Operation::SourceRead { length: 4 },
      Operation::SourceCrc32(0xDEAD_BEEF),
      Operation::TargetCrc32(crc32fast::hash(b"abcd")),
    ];
    let mut target = vec![0u8; 4];
    let result = apply_into(ops.into_iter().map(Ok), b"abcd", &mut target);
    assert!(matches!(result, Err(CorruptPatch::SourceChecksumMismatch { .. })));
  }

  #[test]
  fn rejects_a_target_checksum_mismatch() {
    let ops = vec![
      Operation::Header { source_size: 4, target_size: 4, metadata: String::new() },
      Operation::SourceRead { length: 4 },
      Operation::SourceCrc32(crc32fast::hash(b"abcd")),
      Operation::TargetCrc32(0xDEAD_BEEF),
    ];
    let mut target = vec![0u8; 4];
    let result = apply_into(ops.into_iter().map(Ok), b"abcd", &mut target);
    assert!(matches!(result, Err(CorruptPatch::TargetChecksumMismatch { .. })));
  }

  #[test]
  fn rejects_source_shorter_than_header_claims() {
    let ops = vec![
      Operation::Header { source_size: 10, target_size: 0, metadata: String::new() },
      Operation::SourceCrc32(0),
      Operation::TargetCrc32(0),
    ];
    let mut target = vec![];
    let result = apply_into(ops.into_iter().map(Ok), b"short", &mut target);
    assert!(matches!(result, Err(CorruptPatch::ReadPastSource { .. })));
  }
}
