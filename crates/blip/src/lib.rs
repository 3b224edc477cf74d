//! A BPS ("blip") binary-delta patch toolkit.
//!
//! A BPS patch transforms a source byte buffer into a target byte buffer by
//! describing the target as a sequence of copies from the source, copies
//! from the already-written portion of the target, and literal bytes, each
//! tagged with an integrity-checking CRC32 trailer. This crate provides:
//!
//! - [`apply`]: reconstruct a target buffer from a patch and its source.
//! - [`diff`]: generate a patch transforming one buffer into another.
//! - [`validate`]: check a patch is structurally well-formed without applying it.
//! - [`binary_to_text`] / [`text_to_binary`]: convert between the compact
//!   binary encoding and the line-oriented `blip-asm` textual form.
//!
//! Patch application and generation both operate entirely on in-memory
//! buffers; there is no file I/O, compression, or CLI front-end here.

pub mod apply;
pub mod codec;
mod crc;
pub mod diff;
pub mod ops;
pub mod validate;

#[cfg(test)]
mod tests;

pub use blip_err::CorruptPatch;
pub use diff::DiffOptions;
pub use ops::Operation;

use std::io::Cursor;

/// Applies `patch_bytes` to `source`, producing the target buffer it encodes.
///
/// Validates the decoded operation stream before applying it, so a
/// structurally invalid or tampered patch is rejected rather than producing
/// a garbage target. Also checks the patch's `SourceCrc32`/`TargetCrc32`
/// trailers against the actual CRC32 of `source` and the reconstructed
/// target, so a patch built against the wrong source (or one that has
/// silently produced the wrong target) is rejected rather than returned.
pub fn apply(patch_bytes: &[u8], source: &[u8]) -> Result<Vec<u8>, CorruptPatch> {
  let decoder = codec::binary::Decoder::new(Cursor::new(patch_bytes));
  let mut validated = validate::Validator::new(decoder);

  let header = validated
    .next()
    .ok_or_else(|| CorruptPatch::TruncatedStream { reason: "empty patch".into() })??;
  let target_size = match &header {
    Operation::Header { target_size, .. } => *target_size,
    _ => {
      return Err(CorruptPatch::TruncatedStream {
        reason: "stream does not start with Header".into(),
      })
    }
  };

  let mut target = vec![0u8; target_size as usize];
  apply::apply_into(std::iter::once(Ok(header)).chain(validated), source, &mut target)?;
  Ok(target)
}

/// Produces a binary BPS patch transforming `source` into `target`, tagging
/// it with `metadata` (which may be empty).
///
/// Uses the default block size; see [`diff_with_options`] to override it.
pub fn diff(source: &[u8], target: &[u8], metadata: &str) -> Vec<u8> {
  diff_with_options(source, target, metadata, DiffOptions::default())
}

/// Like [`diff`], but lets the caller override the block size the matching
/// search uses.
pub fn diff_with_options(source: &[u8], target: &[u8], metadata: &str, options: DiffOptions) -> Vec<u8> {
  let generated = diff::diff(source, target, metadata, options);
  // The diff engine is required to emit a stream that passes validation and
  // round-trips through the encoder; a failure here means the engine itself
  // is broken, not that the caller supplied bad input.
  let validated: Vec<Operation> = validate::Validator::new(generated.map(Ok))
    .collect::<Result<_, _>>()
    .expect("the diff engine must emit a self-consistent operation stream");
  codec::binary::Encoder::new(Vec::new())
    .encode(validated)
    .expect("writing to an in-memory Vec<u8> cannot fail")
}

/// Checks that `patch_bytes` is a structurally well-formed BPS patch, without
/// producing the target it describes.
pub fn validate(patch_bytes: &[u8]) -> Result<(), CorruptPatch> {
  let decoder = codec::binary::Decoder::new(Cursor::new(patch_bytes));
  for op in validate::Validator::new(decoder) {
    op?;
  }
  Ok(())
}

/// Converts a binary BPS patch into its `blip-asm` textual form.
pub fn binary_to_text(patch_bytes: &[u8]) -> Result<String, CorruptPatch> {
  let decoder = codec::binary::Decoder::new(Cursor::new(patch_bytes));
  let validated: Vec<Operation> = validate::Validator::new(decoder).collect::<Result<_, _>>()?;
  codec::text::encode(validated)
}

/// Converts a `blip-asm` textual patch into its binary form.
pub fn text_to_binary(text_patch: &str) -> Result<Vec<u8>, CorruptPatch> {
  let ops = codec::text::decode(text_patch)?;
  let validated: Vec<Operation> = validate::Validator::new(ops.into_iter().map(Ok)).collect::<Result<_, _>>()?;
  codec::binary::Encoder::new(Vec::new()).encode(validated)
}
