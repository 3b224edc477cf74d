//! End-to-end scenarios against the public API: diff, apply, validate and
//! the binary/text conversions exercised together rather than in isolation.

use crate::codec::binary::Decoder;
use crate::diff::DiffOptions;
use crate::{apply, binary_to_text, diff, diff_with_options, text_to_binary, validate, CorruptPatch, Operation};
use std::io::Cursor;

fn decode_ops(patch: &[u8]) -> Vec<Operation> {
  Decoder::new(Cursor::new(patch)).collect::<Result<_, _>>().unwrap()
}

fn round_trip(source: &[u8], target: &[u8], metadata: &str) {
  let patch = diff(source, target, metadata);
  assert!(validate(&patch).is_ok());
  let rebuilt = apply(&patch, source).unwrap();
  assert_eq!(rebuilt, target);
}

#[test]
fn prose_edit_round_trips() {
  round_trip(
    b"the quick brown fox jumps over the lazy dog",
    b"the quick brown fox leaps over the lazy dog",
    "",
  );
}

#[test]
fn pure_insertion_round_trips() {
  round_trip(b"start", b"start and then some more content", "insert");
}

#[test]
fn pure_deletion_round_trips() {
  round_trip(b"a long piece of source text here", b"a piece of text", "delete");
}

#[test]
fn source_equals_target_round_trips_as_a_tiny_patch() {
  let source = b"nothing changed at all";
  let patch = diff(source, source, "");
  let rebuilt = apply(&patch, source).unwrap();
  assert_eq!(rebuilt, source);
}

#[test]
fn run_length_repeats_round_trip() {
  round_trip(b"seed", b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "rle");
}

#[test]
fn nul_terminated_target_round_trips() {
  let mut target = b"payload".to_vec();
  target.push(0);
  round_trip(b"payload seed", &target, "");
}

#[test]
fn empty_source_and_target_round_trip() {
  round_trip(b"", b"", "");
}

#[test]
fn metadata_with_a_leading_dot_line_survives_binary_round_trip() {
  let patch = diff(b"abc", b"abd", ".hidden\nreal line");
  let rebuilt = apply(&patch, b"abc").unwrap();
  assert_eq!(rebuilt, b"abd");
}

#[test]
fn validate_rejects_a_corrupted_patch() {
  let mut patch = diff(b"hello", b"hello there", "");
  let last = patch.len() - 1;
  patch[last] ^= 0xFF;
  assert!(matches!(validate(&patch), Err(CorruptPatch::PatchChecksumMismatch { .. })));
}

#[test]
fn apply_rejects_a_source_too_short_for_the_patch() {
  let patch = diff(b"hello", b"hello there", "");
  assert!(apply(&patch, b"hi").is_err());
}

#[test]
fn apply_rejects_a_same_length_source_with_different_content() {
  // Same length as the real source, so none of the structural bounds
  // checks catch it — only the source CRC32 trailer does.
  let patch = diff(b"hello", b"hello there", "");
  let result = apply(&patch, b"jello");
  assert!(matches!(result, Err(CorruptPatch::SourceChecksumMismatch { .. })));
}

#[test]
fn binary_to_text_then_text_to_binary_round_trips() {
  let patch = diff(b"the first version", b"the second version", "round trip");
  let text = binary_to_text(&patch).unwrap();
  let rebuilt_binary = text_to_binary(&text).unwrap();
  let rebuilt = apply(&rebuilt_binary, b"the first version").unwrap();
  assert_eq!(rebuilt, b"the second version");
}

#[test]
fn text_form_is_human_readable() {
  let patch = diff(b"abc", b"abcd", "demo");
  let text = binary_to_text(&patch).unwrap();
  assert!(text.starts_with("blip-asm\n"));
  assert!(text.contains("source-size: 3\n"));
  assert!(text.contains("target-size: 4\n"));
  assert!(text.contains("metadata:\n"));
}

#[test]
fn validate_rejects_truncated_patch_bytes() {
  let patch = diff(b"hello", b"hello there", "");
  let truncated = &patch[..patch.len() / 2];
  assert!(validate(truncated).is_err());
}

#[test]
fn validate_rejects_garbage_bytes() {
  assert!(validate(b"not a bps patch at all").is_err());
}

#[test]
fn single_byte_buffers_round_trip() {
  round_trip(b"a", b"z", "");
}

// The literal scenario table from the format's concrete scenarios: checked
// against the decoded operation stream itself, not just round-trip success,
// so a diff engine that happens to rebuild the target via some other (still
// valid) op sequence doesn't silently mask a divergence from the format.

#[test]
fn scenario_1_both_empty_emits_bare_header() {
  let patch = diff(b"", b"", "");
  let ops = decode_ops(&patch);
  assert_eq!(
    ops[0],
    Operation::Header { source_size: 0, target_size: 0, metadata: String::new() }
  );
  assert_eq!(ops.len(), 3); // header + 2 crc trailers, no body ops
}

#[test]
fn scenario_2_identical_single_byte_is_a_source_read() {
  let patch = diff(b"A", b"A", "");
  let ops = decode_ops(&patch);
  assert_eq!(
    ops[..2],
    [
      Operation::Header { source_size: 1, target_size: 1, metadata: String::new() },
      Operation::SourceRead { length: 1 },
    ]
  );
}

#[test]
fn scenario_3_empty_source_single_byte_target_is_a_target_read() {
  let patch = diff(b"", b"A", "");
  let ops = decode_ops(&patch);
  assert_eq!(
    ops[..2],
    [
      Operation::Header { source_size: 0, target_size: 1, metadata: String::new() },
      Operation::TargetRead { data: b"A".to_vec() },
    ]
  );
}

#[test]
fn scenario_4_transposed_pair_round_trips() {
  round_trip(b"AB", b"BA", "");
}

#[test]
fn scenario_5_run_of_as_uses_at_most_one_target_read_and_one_target_copy() {
  let patch = diff(b"", b"AAAA", "");
  let ops = decode_ops(&patch);
  let target_reads = ops.iter().filter(|op| matches!(op, Operation::TargetRead { .. })).count();
  let target_copies = ops.iter().filter(|op| matches!(op, Operation::TargetCopy { .. })).count();
  assert!(target_reads <= 1);
  assert!(target_copies <= 1);
  assert_eq!(apply(&patch, b"").unwrap(), b"AAAA");
}

#[test]
fn scenario_6_blocksize_two_prefers_the_shared_ab_run() {
  let options = DiffOptions { blocksize: Some(2) };
  let patch = diff_with_options(b"ABABAB", b"AAABBB", "", options);
  let ops = decode_ops(&patch);
  assert_eq!(
    ops,
    vec![
      Operation::Header { source_size: 6, target_size: 6, metadata: String::new() },
      Operation::TargetRead { data: b"AA".to_vec() },
      Operation::SourceRead { length: 2 },
      Operation::TargetRead { data: b"BB".to_vec() },
      Operation::SourceCrc32(0x76F3_4B4D),
      Operation::TargetCrc32(0x1A7E_625E),
    ]
  );
}

#[test]
fn source_and_target_crc32_match_the_standard_ieee_crc32() {
  let patch = diff(b"ABABAB", b"AAABBB", "");
  let ops = decode_ops(&patch);
  assert_eq!(ops[ops.len() - 2], Operation::SourceCrc32(crc32fast::hash(b"ABABAB")));
  assert_eq!(ops[ops.len() - 1], Operation::TargetCrc32(crc32fast::hash(b"AAABBB")));
}
