//! Generates a BPS operation stream transforming one buffer into another.

mod blockmap;
mod engine;

pub use blockmap::BlockMap;
pub use engine::{diff, Diff, DiffOptions};
