// Text canonicalisation helpers
//
// All lengths here are counted in chars, not bytes: the corpus is mostly
// Chinese and byte lengths would triple every threshold.

/// Trim and collapse every internal whitespace run to a single space
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic content hash of the normalized text (BLAKE3, hex)
///
/// Equal after normalization means equal fingerprint, so passages differing
/// only in line breaks or indentation collapse to one.
pub fn fingerprint(text: &str) -> String {
    blake3::hash(normalize(text).as_bytes()).to_hex().to_string()
}

/// Length in Unicode scalar values
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// First `max_chars` characters of `text`, and whether anything was cut
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}
