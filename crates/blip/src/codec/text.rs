//! The `blip-asm` textual form: a line-oriented, human-readable rendering of
//! the same operation stream the binary codec encodes.
//!
//! Grounded on `original_source/blip/io.py`'s `read_blip_asm`/`write_blip_asm`:
//! the magic line, the `label: value` fields, the dot-escaped multiline
//! metadata block, hex data grouped 40 bytes per line, and signed decimal
//! copy offsets written with an explicit `+`/`-`.

use crate::ops::Operation;
use blip_err::CorruptPatch;

pub const TEXT_MAGIC: &str = "blip-asm";

/// Renders an operation stream as `blip-asm` text.
pub fn encode(ops: impl IntoIterator<Item = Operation>) -> Result<String, CorruptPatch> {
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

  let mut out = String::new();
  out.push_str(TEXT_MAGIC);
  out.push('\n');
  out.push_str(&format!("source-size: {source_size}\n"));
  out.push_str(&format!("target-size: {target_size}\n"));
  write_metadata_block(&metadata, &mut out);

  for op in iter {
    match op {
      Operation::SourceRead { length } => out.push_str(&format!("source-read: {length}\n")),
      Operation::TargetRead { data } => write_target_read(&data, &mut out),
      Operation::SourceCopy { length, offset } => {
        out.push_str(&format!("source-copy: {length} {offset:+}\n"))
      }
      Operation::TargetCopy { length, offset } => {
        out.push_str(&format!("target-copy: {length} {offset:+}\n"))
      }
      Operation::SourceCrc32(v) => out.push_str(&format!("source-crc32: {v:08X}\n")),
      Operation::TargetCrc32(v) => out.push_str(&format!("target-crc32: {v:08X}\n")),
      Operation::Header { .. } => {
        return Err(CorruptPatch::DuplicateOrMisorderedTrailer {
          reason: "a second Header appeared mid-stream".into(),
        })
      }
    }
  }

  Ok(out)
}

/// Parses `blip-asm` text back into an operation stream.
pub fn decode(text: &str) -> Result<Vec<Operation>, CorruptPatch> {
  let mut lines = text.lines();

  let magic = lines.next().ok_or_else(truncated)?;
  if magic != TEXT_MAGIC {
    return Err(CorruptPatch::BadMagic { expected: TEXT_MAGIC.as_bytes(), found: magic.as_bytes().to_vec() });
  }
  let source_size = read_labeled_decimal(&mut lines, "source-size")?;
  let target_size = read_labeled_decimal(&mut lines, "target-size")?;
  expect_line(&mut lines, "metadata:")?;
  let metadata = read_multiline_text(&mut lines)?;

  let mut ops = vec![Operation::Header { source_size, target_size, metadata }];
  let mut target_write_offset: u64 = 0;

  while target_write_offset < u64::from(target_size) {
    let line = lines.next().ok_or_else(truncated)?;
    let (label, rest) = split_label(line)?;
    match label {
      "source-read" => {
        let length: u32 = rest
          .trim()
          .parse()
          .map_err(|_| CorruptPatch::BadVarInt { reason: format!("bad source-read length: {rest}") })?;
        target_write_offset += u64::from(length);
        ops.push(Operation::SourceRead { length });
      }
      "target-read" => {
        let data = read_hex_block(&mut lines)?;
        target_write_offset += data.len() as u64;
        ops.push(Operation::TargetRead { data });
      }
      "source-copy" | "target-copy" => {
        let mut parts = rest.trim().split_whitespace();
        let length: u32 = parts
          .next()
          .and_then(|s| s.parse().ok())
          .ok_or_else(|| CorruptPatch::BadVarInt { reason: format!("bad {label} length: {rest}") })?;
        let offset: i64 = parts
          .next()
          .and_then(|s| s.parse().ok())
          .ok_or_else(|| CorruptPatch::BadVarInt { reason: format!("bad {label} offset: {rest}") })?;
        target_write_offset += u64::from(length);
        ops.push(if label == "source-copy" {
          Operation::SourceCopy { length, offset }
        } else {
          Operation::TargetCopy { length, offset }
        });
      }
      other => {
        return Err(CorruptPatch::BadVarInt { reason: format!("unknown operation label {other:?}") })
      }
    }
  }

  let source_crc = read_labeled_hex32(&mut lines, "source-crc32")?;
  ops.push(Operation::SourceCrc32(source_crc));
  let target_crc = read_labeled_hex32(&mut lines, "target-crc32")?;
  ops.push(Operation::TargetCrc32(target_crc));

  Ok(ops)
}

fn write_metadata_block(metadata: &str, out: &mut String) {
  out.push_str("metadata:\n");
  let mut lines: Vec<&str> = metadata.split('\n').collect();
  if lines.last() == Some(&"") {
    lines.pop();
  }
  for line in lines {
    if line.starts_with('.') {
      out.push('.');
    }
    out.push_str(line);
    out.push('\n');
  }
  out.push_str(".\n");
}

fn write_target_read(data: &[u8], out: &mut String) {
  out.push_str("target-read:\n");
  for chunk in data.chunks(40) {
    for byte in chunk {
      out.push_str(&format!("{byte:02x}"));
    }
    out.push('\n');
  }
  out.push_str(".\n");
}

fn read_multiline_text<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<String, CorruptPatch> {
  let mut collected = Vec::new();
  loop {
    let line = lines.next().ok_or_else(truncated)?;
    if line == "." {
      break;
    }
    collected.push(line.strip_prefix('.').unwrap_or(line));
  }
  Ok(collected.join("\n"))
}

fn read_hex_block<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<Vec<u8>, CorruptPatch> {
  let mut hex = String::new();
  loop {
    let line = lines.next().ok_or_else(truncated)?;
    if line == "." {
      break;
    }
    hex.extend(line.chars().filter(|c| c.is_ascii_hexdigit()));
  }
  decode_hex(&hex)
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, CorruptPatch> {
  if hex.len() % 2 != 0 {
    return Err(CorruptPatch::BadVarInt {
      reason: "odd number of hex digits in target-read data".into(),
    });
  }
  let bytes = hex.as_bytes();
  bytes
    .chunks(2)
    .map(|pair| {
      let s = std::str::from_utf8(pair).expect("ascii hex digits are valid utf-8");
      u8::from_str_radix(s, 16).map_err(|_| CorruptPatch::BadVarInt { reason: format!("bad hex byte {s:?}") })
    })
    .collect()
}

fn truncated() -> CorruptPatch {
  CorruptPatch::TruncatedStream { reason: "unexpected end of blip-asm text".into() }
}

fn split_label(line: &str) -> Result<(&str, &str), CorruptPatch> {
  line
    .split_once(':')
    .ok_or_else(|| CorruptPatch::BadVarInt { reason: format!("malformed line: {line:?}") })
}

fn expect_line<'a>(lines: &mut impl Iterator<Item = &'a str>, expected: &str) -> Result<(), CorruptPatch> {
  let line = lines.next().ok_or_else(truncated)?;
  if line != expected {
    return Err(CorruptPatch::BadVarInt { reason: format!("expected {expected:?}, found {line:?}") });
  }
  Ok(())
}

fn read_labeled_decimal<'a>(lines: &mut impl Iterator<Item = &'a str>, label: &str) -> Result<u32, CorruptPatch> {
  let line = lines.next().ok_or_else(truncated)?;
  let (found_label, value) = split_label(line)?;
  if found_label != label {
    return Err(CorruptPatch::BadVarInt { reason: format!("expected {label:?}, found {found_label:?}") });
  }
  value
    .trim()
    .parse()
    .map_err(|_| CorruptPatch::SizeNegative { reason: format!("{label}: {value}") })
}

fn read_labeled_hex32<'a>(lines: &mut impl Iterator<Item = &'a str>, label: &str) -> Result<u32, CorruptPatch> {
  let line = lines.next().ok_or_else(truncated)?;
  let (found_label, value) = split_label(line)?;
  if found_label != label {
    return Err(CorruptPatch::DuplicateOrMisorderedTrailer {
      reason: format!("expected {label:?}, found {found_label:?}"),
    });
  }
  u32::from_str_radix(value.trim(), 16).map_err(|_| CorruptPatch::BadVarInt { reason: format!("{label}: {value}") })
}
