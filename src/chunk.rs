//! Boundary-aware sliding-window text chunker.
//!
//! Splits extracted document text into overlapping fragments of at most
//! `size` characters. Cuts prefer sentence ends, then whitespace, so that
//! fragments rarely split a word or a sentence in half.
//!
//! # Algorithm
//!
//! 1. If the text fits in one window, return it trimmed as a single fragment.
//! 2. Otherwise open a window `[start, start + size)`.
//! 3. If the window does not reach the end of the text, look backward from its
//!    right edge for a sentence terminator (`.`, `!`, `?` followed by
//!    whitespace) inside the second half of the window and cut just after it.
//! 4. Failing that, cut at the nearest whitespace anywhere in the window.
//! 5. Failing that, hard-cut at the window edge.
//! 6. The next window starts at `end - overlap` (clamped to zero, and always
//!    moving forward).
//!
//! All lengths are counted in `char`s, never bytes, so multi-byte text never
//! gets split inside a code point.
//!
//! # Example
//!
//! ```rust
//! use docsift::chunk::chunk_text;
//!
//! let chunks = chunk_text("  Hello world.  ", 1200, 150);
//! assert_eq!(chunks, vec!["Hello world.".to_string()]);
//! ```

/// Split `text` into ordered, overlapping fragments.
///
/// Whitespace-only input yields no fragments. No returned fragment is empty
/// or whitespace-only.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total <= size || size == 0 {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![trimmed.to_string()];
    }

    let mut fragments = Vec::new();
    let mut start = 0usize;

    loop {
        let mut end = (start + size).min(total);

        if end < total {
            end = find_cut(&chars, start, end, size).unwrap_or(end);
        }

        let fragment: String = chars[start..end].iter().collect();
        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            fragments.push(trimmed.to_string());
        }

        if end >= total {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    fragments
}

/// Pick a cut position inside `[start, end)`, or `None` for a hard cut.
fn find_cut(chars: &[char], start: usize, end: usize, size: usize) -> Option<usize> {
    let half = start + size / 2;

    let sentence_end = (half..end)
        .rev()
        .find(|&i| is_terminator(chars[i]) && chars.get(i + 1).is_some_and(|c| c.is_whitespace()));
    if let Some(pos) = sentence_end {
        return Some(pos + 1);
    }

    (start + 1..end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Approximate token count: the number of whitespace-delimited words.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}
