//! A fixed-size-block hash index over a byte buffer, used by the diff engine
//! to find candidate copy sources in roughly linear time.
//!
//! Grounded on `original_source/bps/diff.py`'s use of a block-keyed `dict`
//! (there called `sourcemap`/`targetmap`) mapping each block's bytes to the
//! list of offsets it occurs at.

use std::collections::HashMap;

/// Maps block contents to every offset in the indexed buffer where that
/// exact byte sequence occurs.
#[derive(Default)]
pub struct BlockMap {
  offsets: HashMap<Box<[u8]>, Vec<u32>>,
}

impl BlockMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Records that `block` occurs at `offset`.
  pub fn add(&mut self, block: &[u8], offset: u32) {
    self.offsets.entry(block.into()).or_default().push(offset);
  }

  /// All offsets previously recorded for a block with these exact contents.
  pub fn lookup(&self, block: &[u8]) -> &[u32] {
    self.offsets.get(block).map(Vec::as_slice).unwrap_or(&[])
  }
}
