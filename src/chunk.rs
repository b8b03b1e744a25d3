//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into chunks that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`) to
//! keep related sentences together; paragraphs that are too long on their
//! own are hard-split on line or word boundaries.
//!
//! With `overlap_tokens > 0`, every chunk after the first starts with the
//! tail of its predecessor, so a passage cut at a boundary is still
//! retrievable as a whole from one of the two chunks.

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

pub const DEFAULT_MAX_TOKENS: usize = 500;
pub const DEFAULT_OVERLAP_TOKENS: usize = 100;

/// A chunking policy: a deterministic split of text into bounded windows.
pub trait Chunker: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Packs paragraphs into windows of at most `max_tokens`, with an
/// `overlap_tokens` carry-over between consecutive windows.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    max_tokens: usize,
    overlap_tokens: usize,
}

impl ParagraphChunker {
    /// `max_tokens` is raised to at least 1 and `overlap_tokens` is capped
    /// below `max_tokens`.
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        let max_tokens = max_tokens.max(1);
        Self {
            max_tokens,
            overlap_tokens: overlap_tokens.min(max_tokens - 1),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_TOKENS)
    }
}

impl Chunker for ParagraphChunker {
    fn split(&self, text: &str) -> Vec<String> {
        let overlap_chars = self.overlap_tokens * CHARS_PER_TOKEN;
        // The overlap prefix and its joining space are part of the window,
        // so the packed body gets what is left of the budget.
        let separator = usize::from(overlap_chars > 0);
        let body_chars = (self.max_tokens * CHARS_PER_TOKEN)
            .saturating_sub(overlap_chars + separator)
            .max(1);

        let pieces = pack_paragraphs(text, body_chars);
        if overlap_chars == 0 || pieces.len() < 2 {
            return pieces;
        }

        let mut chunks = Vec::with_capacity(pieces.len());
        for (i, piece) in pieces.iter().enumerate() {
            if i == 0 {
                chunks.push(piece.clone());
                continue;
            }
            let carry = tail_on_word_boundary(&pieces[i - 1], overlap_chars);
            if carry.is_empty() {
                chunks.push(piece.clone());
            } else {
                chunks.push(format!("{} {}", carry, piece));
            }
        }
        chunks
    }
}

/// Split text into chunks on paragraph boundaries, respecting `max_chars`.
fn pack_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // If adding this paragraph would exceed max, flush current buffer
        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut chunks);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(current_buf);
    }

    chunks
}

/// Split an oversized paragraph at `max_chars` boundaries, preferring a
/// newline or space and never cutting through a UTF-8 character.
fn hard_split(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let split_at = if remaining.len() <= max_chars {
            remaining.len()
        } else {
            let limit = floor_char_boundary(remaining, max_chars);
            let window = &remaining[..limit];
            match window.rfind('\n').or_else(|| window.rfind(' ')) {
                Some(pos) if pos > 0 => pos + 1,
                // A single character wider than the budget still has to go somewhere.
                _ if limit == 0 => next_char_boundary(remaining, 0),
                _ => limit,
            }
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// The last `max_chars` bytes of `text`, starting at a word boundary.
fn tail_on_word_boundary(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text.trim();
    }
    let start = ceil_char_boundary(text, text.len() - max_chars);
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim(),
        None => tail.trim(),
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn next_char_boundary(s: &str, idx: usize) -> usize {
    ceil_char_boundary(s, idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = ParagraphChunker::new(700, 0).split("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(ParagraphChunker::default().split("").is_empty());
        assert!(ParagraphChunker::default().split("  \n\n \n").is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = ParagraphChunker::new(700, 0).split(text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("First paragraph."));
        assert!(chunks[0].contains("Third paragraph."));
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        // max_tokens=6 => max_chars=24
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = ParagraphChunker::new(6, 0).split(text);
        assert_eq!(
            chunks,
            vec![
                "This is paragraph one.".to_string(),
                "This is paragraph two.".to_string(),
                "This is paragraph three.".to_string(),
            ]
        );
    }

    #[test]
    fn test_overlap_carries_tail_of_previous_chunk() {
        let text = "alpha beta gamma delta\n\nepsilon zeta eta theta";
        // max 8 tokens (32 chars), overlap 2 tokens (8 chars) => body 24 chars
        let chunks = ParagraphChunker::new(8, 2).split(text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "alpha beta gamma delta");
        assert!(chunks[1].starts_with("delta "));
        assert!(chunks[1].ends_with("epsilon zeta eta theta"));
    }

    #[test]
    fn test_overlapped_chunks_stay_within_max_chars() {
        // max 8 tokens (32 chars), overlap 2 tokens (8 chars)
        let text = format!("aaaaaaa bbbbbbbb\n\n{}", "c".repeat(24));
        let chunks = ParagraphChunker::new(8, 2).split(&text);
        assert!(chunks.len() >= 2);
        assert!(chunks[1].starts_with("bbbbbbbb "));
        for chunk in &chunks {
            assert!(chunk.len() <= 32, "{:?} is {} bytes", chunk, chunk.len());
        }
    }

    #[test]
    fn test_hard_split_respects_utf8_boundaries() {
        let text = "é".repeat(50);
        let chunks = ParagraphChunker::new(3, 0).split(&text);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
        for chunk in &chunks {
            assert!(chunk.len() <= 12);
        }
    }

    #[test]
    fn test_hard_split_prefers_spaces() {
        let text = "aaaa bbbb cccc dddd eeee";
        let chunks = ParagraphChunker::new(3, 0).split(text);
        for chunk in &chunks {
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
            assert!(chunk.len() <= 12);
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let chunker = ParagraphChunker::new(3, 1);
        assert_eq!(chunker.split(text), chunker.split(text));
    }

    #[test]
    fn test_overlap_is_capped_below_max() {
        let chunker = ParagraphChunker::new(4, 10);
        assert_eq!(chunker.overlap_tokens(), 3);
        assert_eq!(ParagraphChunker::new(0, 0).max_tokens(), 1);
    }
}
