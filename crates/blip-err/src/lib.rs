//! The `CorruptPatch` error domain shared by the codec, validator and
//! diff-application halves of `blip`.
//!
//! All errors here are unrecoverable at the core boundary: a caller that
//! hits any of them should discard the in-progress apply/diff invocation
//! rather than try to resume it.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorruptPatch {
  #[error("bad magic: expected {expected:?}, found {found:?}")]
  BadMagic { expected: &'static [u8], found: Vec<u8> },

  #[error("truncated patch stream: {reason}")]
  TruncatedStream { reason: String },

  #[error("malformed varint: {reason}")]
  BadVarInt { reason: String },

  #[error("unknown opcode {opcode:#04b}")]
  BadOpcode { opcode: u8 },

  #[error("source-read of {length} bytes at target offset {offset} reads past source size")]
  ReadPastSource { offset: u64, length: u32 },

  #[error("target-copy cursor {cursor} is not before the currently written offset {target_write_offset}")]
  ReadPastWrittenTarget { cursor: i64, target_write_offset: u64 },

  #[error("cursor went negative: {cursor}")]
  NegativeCursor { cursor: i64 },

  #[error("writing {length} bytes at target offset {offset} overflows target size {target_size}")]
  WriteOverflowsTarget { offset: u64, length: u32, target_size: u32 },

  #[error("target-read data must not be empty")]
  TargetReadEmpty,

  #[error("size field must not be negative: {reason}")]
  SizeNegative { reason: String },

  #[error("metadata is not valid UTF-8")]
  MetadataNotUtf8,

  #[error("duplicate or misordered trailer: {reason}")]
  DuplicateOrMisorderedTrailer { reason: String },

  #[error("trailing garbage after the trailer")]
  TrailingGarbage,

  #[error("patch checksum mismatch: expected {expected:08X}, computed {actual:08X}")]
  PatchChecksumMismatch { expected: u32, actual: u32 },

  #[error("source checksum mismatch: expected {expected:08X}, computed {actual:08X}")]
  SourceChecksumMismatch { expected: u32, actual: u32 },

  #[error("target checksum mismatch: expected {expected:08X}, computed {actual:08X}")]
  TargetChecksumMismatch { expected: u32, actual: u32 },

  #[error("unsupported operation: {reason}")]
  UnsupportedOperation { reason: String },

  #[error(transparent)]
  Io(#[from] io::Error),
}

impl From<io::ErrorKind> for CorruptPatch {
  fn from(kind: io::ErrorKind) -> Self {
    CorruptPatch::Io(io::Error::from(kind))
  }
}

/// Maps an I/O error arising from decoding patch bytes into a `CorruptPatch`,
/// treating EOF the way the format's own truncation case does.
///
/// Mirrors the teacher's `patch::Error: From<io::Error>`, which maps
/// `UnexpectedEof` to `BadPatch` rather than surfacing a bare I/O error.
pub fn map_decode_io_err(err: io::Error) -> CorruptPatch {
  match err.kind() {
    io::ErrorKind::UnexpectedEof => CorruptPatch::TruncatedStream { reason: err.to_string() },
    io::ErrorKind::InvalidData => CorruptPatch::BadVarInt { reason: err.to_string() },
    _ => CorruptPatch::Io(err),
  }
}
