//! Sentence-aware input chunking.
//!
//! Providers cap the input size of a single synthesis call. Oversized text is
//! split into ordered segments that end at sentence boundaries (terminal
//! punctuation followed by whitespace, or end of input), so each provider call
//! receives speakable prose. A single sentence longer than the limit is
//! hard-split at the nearest whitespace before the limit.
//!
//! Every segment is a verbatim slice of the input, trailing whitespace
//! included, so concatenating the segments reconstructs the original text
//! byte for byte. Callers never observe chunking: the dispatcher stitches the
//! per-chunk audio back into one asset.

/// Split `text` into segments of at most `max_units` characters.
///
/// `max_units == 0` disables splitting. Empty input yields an empty vec.
pub fn chunk(text: &str, max_units: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_units == 0 || text.chars().count() <= max_units {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        if current_len + sentence_len <= max_units {
            current.push_str(sentence);
            current_len += sentence_len;
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if sentence_len <= max_units {
            current.push_str(sentence);
            current_len = sentence_len;
        } else {
            let mut rest = sentence;
            while rest.chars().count() > max_units {
                let split_at = hard_split_point(rest, max_units);
                chunks.push(rest[..split_at].to_string());
                rest = &rest[split_at..];
            }
            current.push_str(rest);
            current_len = rest.chars().count();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Billable unit count of a text: whitespace-separated words.
pub fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split into sentences, each carrying its trailing whitespace run.
///
/// A boundary is a terminal punctuation run followed by whitespace; the
/// whitespace belongs to the finished sentence so slices tile the input.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut seen_terminal = false;
    let mut in_trailing_ws = false;

    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        if !ws && in_trailing_ws {
            out.push(&text[start..i]);
            start = i;
            seen_terminal = false;
            in_trailing_ws = false;
        }
        if ws {
            if seen_terminal {
                in_trailing_ws = true;
            }
        } else if is_terminal(c) {
            seen_terminal = true;
        } else {
            seen_terminal = false;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Byte offset to cut an oversized sentence at: after the last whitespace
/// within the first `max_units` characters, or at the character limit when
/// the span contains no whitespace at all.
fn hard_split_point(s: &str, max_units: usize) -> usize {
    debug_assert!(max_units > 0);
    let mut limit_byte = s.len();
    let mut last_ws_end = None;
    for (count, (i, c)) in s.char_indices().enumerate() {
        if count == max_units {
            limit_byte = i;
            break;
        }
        if c.is_whitespace() {
            last_ws_end = Some(i + c.len_utf8());
        }
    }
    last_ws_end.unwrap_or(limit_byte)
}
