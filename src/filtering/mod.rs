// Passage hygiene for retrieved candidates
//
// normalize: whitespace canonicalisation shared by dedup and output
// fingerprint: content hash used as the dedup set key
// JunkFilter: drops short passages and known boilerplate before ranking

mod junk;
mod text;

pub use junk::JunkFilter;
pub use text::{char_len, fingerprint, normalize, truncate_chars};
