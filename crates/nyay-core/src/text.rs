//! Character-budget helpers. All budgets count `char`s, not bytes.

/// Budget for a serialized tool result appended to the transcript.
pub const TRANSCRIPT_BUDGET: usize = 3000;

/// Appended after a transcript entry cut at [`TRANSCRIPT_BUDGET`].
pub const TRUNCATION_SUFFIX: &str = "...\"}";

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// `text` cut to `max_chars` with `...` appended when anything was dropped.
pub fn ellipsize(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Cut a serialized tool result to the transcript budget.
pub fn truncate_for_transcript(serialized: &str) -> String {
    let cut = truncate_chars(serialized, TRANSCRIPT_BUDGET);
    if cut.len() < serialized.len() {
        format!("{}{}", cut, TRUNCATION_SUFFIX)
    } else {
        serialized.to_string()
    }
}

/// Round a similarity score to three decimals.
pub fn round_score(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}
