//! The two wire encodings for a BPS operation stream: binary and `blip-asm` text.

pub mod binary;
pub mod text;
