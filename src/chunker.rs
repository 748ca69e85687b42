//! Fixed-window overlapping text chunker.
//!
//! Splits extracted document text into overlapping character windows sized
//! by an approximate token budget. No tokenizer dependency: one token is
//! taken to be four characters.
//!
//! Pure and restartable: the same input always yields the same spans.

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Windows never shrink below this many characters regardless of budget.
const MIN_WINDOW_CHARS: usize = 200;

/// One emitted window: character offsets into the source text plus the text
/// of the span itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Split `text` into consecutive windows of roughly `target_tokens` tokens
/// with `overlap_tokens` tokens of overlap between neighbors.
///
/// The final window is clipped to the exact end of the text and terminates
/// the sequence. When the requested overlap meets or exceeds the window
/// size the stride degenerates to the full window and chunks are disjoint.
pub fn chunk_text(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<TextWindow> {
    if text.is_empty() {
        return Vec::new();
    }

    let window = MIN_WINDOW_CHARS.max(target_tokens * CHARS_PER_TOKEN);
    let stride = window.saturating_sub(overlap_tokens * CHARS_PER_TOKEN);

    // Offsets are character offsets, not byte offsets, so multi-byte text
    // chunks cleanly.
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    let mut windows = Vec::new();
    let mut i = 0;
    while i < n {
        let j = n.min(i + window);
        windows.push(TextWindow {
            start: i,
            end: j,
            text: chars[i..j].iter().collect(),
        });
        if j == n {
            break;
        }
        i += if stride > 0 { stride } else { window };
    }

    windows
}
