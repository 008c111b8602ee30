//! Small string helpers shared by the state labels and the report

/// Prefix of at most `max_chars` characters, cut on a char boundary
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
