//! Structural validation of a decoded operation stream.
//!
//! A direct port of `original_source/blip/io.py`'s `check_stream`: wraps any
//! operation iterator and enforces, in order, that it opens with exactly one
//! `Header`, that every copy cursor stays within bounds, that `TargetCopy`
//! never reads ahead of what has already been written, that the target is
//! filled to exactly `target_size`, that the two checksum trailers appear
//! once each in order, and that nothing follows them.

use crate::ops::Operation;
use blip_err::CorruptPatch;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
  Header,
  Body,
  SourceCrc,
  TargetCrc,
  End,
  Done,
}

/// Wraps an operation iterator, checking every BPS stream invariant as items
/// pass through.
pub struct Validator<I> {
  inner: I,
  phase: Phase,
  source_size: u64,
  target_size: u64,
  target_write_offset: u64,
  source_copy_cursor: i64,
  target_copy_cursor: i64,
}

impl<I> Validator<I> {
  pub fn new(inner: I) -> Self {
    Self {
      inner,
      phase: Phase::Header,
      source_size: 0,
      target_size: 0,
      target_write_offset: 0,
      source_copy_cursor: 0,
      target_copy_cursor: 0,
    }
  }
}

impl<I: Iterator<Item = Result<Operation, CorruptPatch>>> Validator<I> {
  fn fail(&mut self, err: CorruptPatch) -> Option<Result<Operation, CorruptPatch>> {
    self.phase = Phase::Done;
    Some(Err(err))
  }

  fn apply_and_check(&mut self, op: &Operation) -> Result<(), CorruptPatch> {
    // Per-variant checks (source/target bounds, cursor sign) run before the
    // generic "does this overflow the target" check below, matching the
    // reference `check_stream`'s order: when an operation violates both at
    // once (e.g. a source-read long enough to overflow both the source and
    // the target), the more specific error is the one reported.
    match op {
      Operation::SourceRead { length } => {
        if *length == 0 {
          return Err(CorruptPatch::BadVarInt { reason: "source-read length must be at least 1".into() });
        }
        if self.target_write_offset + u64::from(*length) > self.source_size {
          return Err(CorruptPatch::ReadPastSource { offset: self.target_write_offset, length: *length });
        }
      }
      Operation::TargetRead { data } => {
        if data.is_empty() {
          return Err(CorruptPatch::TargetReadEmpty);
        }
      }
      Operation::SourceCopy { length, offset } => {
        if *length == 0 {
          return Err(CorruptPatch::BadVarInt { reason: "source-copy length must be at least 1".into() });
        }
        let new_cursor = self
          .source_copy_cursor
          .checked_add(*offset)
          .ok_or(CorruptPatch::NegativeCursor { cursor: self.source_copy_cursor })?;
        if new_cursor < 0 {
          return Err(CorruptPatch::NegativeCursor { cursor: new_cursor });
        }
        (new_cursor as u64)
          .checked_add(u64::from(*length))
          .filter(|&end| end <= self.source_size)
          .ok_or(CorruptPatch::ReadPastSource { offset: new_cursor as u64, length: *length })?;
        self.source_copy_cursor = new_cursor + i64::from(*length);
      }
      Operation::TargetCopy { length, offset } => {
        if *length == 0 {
          return Err(CorruptPatch::BadVarInt { reason: "target-copy length must be at least 1".into() });
        }
        let new_cursor = self
          .target_copy_cursor
          .checked_add(*offset)
          .ok_or(CorruptPatch::NegativeCursor { cursor: self.target_copy_cursor })?;
        if new_cursor < 0 {
          return Err(CorruptPatch::NegativeCursor { cursor: new_cursor });
        }
        if (new_cursor as u64) >= self.target_write_offset {
          return Err(CorruptPatch::ReadPastWrittenTarget {
            cursor: new_cursor,
            target_write_offset: self.target_write_offset,
          });
        }
        self.target_copy_cursor = new_cursor + i64::from(*length);
      }
      Operation::Header { .. } | Operation::SourceCrc32(_) | Operation::TargetCrc32(_) => {
        unreachable!("header and trailers are handled by the phase machine, not apply_and_check")
      }
    }

    let bytespan = op.bytespan();
    self.target_write_offset = self
      .target_write_offset
      .checked_add(u64::from(bytespan))
      .filter(|&v| v <= self.target_size)
      .ok_or(CorruptPatch::WriteOverflowsTarget {
        offset: self.target_write_offset,
        length: bytespan,
        target_size: self.target_size as u32,
      })?;
    Ok(())
  }
}

impl<I: Iterator<Item = Result<Operation, CorruptPatch>>> Iterator for Validator<I> {
  type Item = Result<Operation, CorruptPatch>;

  fn next(&mut self) -> Option<Self::Item> {
    match self.phase {
      Phase::Header => {
        let item = match self.inner.next() {
          Some(Ok(op)) => op,
          Some(Err(err)) => return self.fail(err),
          None => return self.fail(CorruptPatch::TruncatedStream { reason: "missing header".into() }),
        };
        let (source_size, target_size) = match &item {
          Operation::Header { source_size, target_size, .. } => (*source_size, *target_size),
          _ => {
            return self.fail(CorruptPatch::TruncatedStream {
              reason: "stream does not start with Header".into(),
            })
          }
        };
        self.source_size = u64::from(source_size);
        self.target_size = u64::from(target_size);
        self.phase = Phase::Body;
        Some(Ok(item))
      }
      Phase::Body => {
        if self.target_write_offset >= self.target_size {
          self.phase = Phase::SourceCrc;
          return self.next();
        }
        let item = match self.inner.next() {
          Some(Ok(op)) => op,
          Some(Err(err)) => return self.fail(err),
          None => {
            return self.fail(CorruptPatch::TruncatedStream {
              reason: "patch ends before target size is reached".into(),
            })
          }
        };
        if let Err(err) = self.apply_and_check(&item) {
          return self.fail(err);
        }
        Some(Ok(item))
      }
      Phase::SourceCrc => {
        let item = match self.inner.next() {
          Some(Ok(op)) => op,
          Some(Err(err)) => return self.fail(err),
          None => return self.fail(CorruptPatch::TruncatedStream { reason: "missing source-crc32".into() }),
        };
        if !matches!(item, Operation::SourceCrc32(_)) {
          return self.fail(CorruptPatch::DuplicateOrMisorderedTrailer {
            reason: "expected source-crc32".into(),
          });
        }
        self.phase = Phase::TargetCrc;
        Some(Ok(item))
      }
      Phase::TargetCrc => {
        let item = match self.inner.next() {
          Some(Ok(op)) => op,
          Some(Err(err)) => return self.fail(err),
          None => return self.fail(CorruptPatch::TruncatedStream { reason: "missing target-crc32".into() }),
        };
        if !matches!(item, Operation::TargetCrc32(_)) {
          return self.fail(CorruptPatch::DuplicateOrMisorderedTrailer {
            reason: "expected target-crc32".into(),
          });
        }
        self.phase = Phase::End;
        Some(Ok(item))
      }
      Phase::End => match self.inner.next() {
        None => {
          self.phase = Phase::Done;
          None
        }
        Some(_) => self.fail(CorruptPatch::TrailingGarbage),
      },
      Phase::Done => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ok(op: Operation) -> Result<Operation, CorruptPatch> {
    Ok(op)
  }

  fn minimal_valid_stream() -> Vec<Result<Operation, CorruptPatch>> {
    vec![
      ok(Operation::Header { source_size: 4, target_size: 4, metadata: String::new() }),
      ok(Operation::SourceRead { length: 4 }),
      ok(Operation::SourceCrc32(0)),
      ok(Operation::TargetCrc32(0)),
    ]
  }

  #[test]
  fn accepts_a_well_formed_stream() {
    let result: Result<Vec<_>, _> = Validator::new(minimal_valid_stream().into_iter()).collect();
    assert!(result.is_ok());
  }

  #[test]
  fn rejects_missing_header() {
    let ops = vec![ok(Operation::SourceCrc32(0))];
    let result: Result<Vec<_>, _> = Validator::new(ops.into_iter()).collect();
    assert!(result.is_err());
  }

  #[test]
  fn rejects_source_read_past_source_end() {
    let ops = vec![
      ok(Operation::Header { source_size: 2, target_size: 4, metadata: String::new() }),
      ok(Operation::SourceRead { length: 4 }),
    ];
    let result: Result<Vec<_>, _> = Validator::new(ops.into_iter()).collect();
    assert!(matches!(result, Err(CorruptPatch::ReadPastSource { .. })));
  }

  #[test]
  fn reports_read_past_source_over_write_overflows_target_when_both_apply() {
    // source_size=2, target_size=4, length=10: both the source-bounds check
    // and the generic target-overflow check fail. The specific error wins.
    let ops = vec![
      ok(Operation::Header { source_size: 2, target_size: 4, metadata: String::new() }),
      ok(Operation::SourceRead { length: 10 }),
    ];
    let result: Result<Vec<_>, _> = Validator::new(ops.into_iter()).collect();
    assert!(matches!(result, Err(CorruptPatch::ReadPastSource { .. })));
  }

  #[test]
  fn rejects_target_copy_reading_unwritten_target() {
    let ops = vec![
      ok(Operation::Header { source_size: 0, target_size: 4, metadata: String::new() }),
      ok(Operation::TargetCopy { length: 4, offset: 0 }),
    ];
    let result: Result<Vec<_>, _> = Validator::new(ops.into_iter()).collect();
    assert!(matches!(result, Err(CorruptPatch::ReadPastWrittenTarget { .. })));
  }

  #[test]
  fn rejects_negative_cursor() {
    let ops = vec![
      ok(Operation::Header { source_size: 4, target_size: 4, metadata: String::new() }),
      ok(Operation::SourceCopy { length: 4, offset: -1 }),
    ];
    let result: Result<Vec<_>, _> = Validator::new(ops.into_iter()).collect();
    assert!(matches!(result, Err(CorruptPatch::NegativeCursor { .. })));
  }

  #[test]
  fn rejects_trailing_garbage() {
    let mut ops = minimal_valid_stream();
    ops.push(ok(Operation::SourceRead { length: 1 }));
    let result: Result<Vec<_>, _> = Validator::new(ops.into_iter()).collect();
    assert!(matches!(result, Err(CorruptPatch::TrailingGarbage)));
  }

  #[test]
  fn rejects_empty_target_read() {
    let ops = vec![
      ok(Operation::Header { source_size: 0, target_size: 1, metadata: String::new() }),
      ok(Operation::TargetRead { data: vec![] }),
    ];
    let result: Result<Vec<_>, _> = Validator::new(ops.into_iter()).collect();
    assert!(matches!(result, Err(CorruptPatch::TargetReadEmpty)));
  }
}
