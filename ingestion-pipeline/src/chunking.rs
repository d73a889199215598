//! Greedy overlapping windows over source text. Windows prefer to break at
//! sentence-ending punctuation within the last 200 chars, else at
//! whitespace within the last 100, else hard-cut at the window edge.

pub const DEFAULT_MAX_CHARS: usize = 1200;
pub const DEFAULT_OVERLAP: usize = 150;
const SENTENCE_LOOKBACK: usize = 200;
const WHITESPACE_LOOKBACK: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    pub text: String,
    pub index: i64,
}

pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<ChunkPiece> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0i64;

    while start < chars.len() {
        // The window end stays unclamped: the next window starts relative
        // to it, which is what lets the final partial window terminate.
        let mut end = start + max_chars;

        if end < chars.len() {
            let sentence_floor = end.saturating_sub(SENTENCE_LOOKBACK).max(start);
            let whitespace_floor = end.saturating_sub(WHITESPACE_LOOKBACK).max(start);

            let mut found = None;
            for i in (sentence_floor..=end).rev() {
                if matches!(chars.get(i), Some('.' | '\n' | '!' | '?')) {
                    found = Some(i + 1);
                    break;
                }
            }
            if found.is_none() {
                for i in (whitespace_floor..=end).rev() {
                    if chars.get(i) == Some(&' ') {
                        found = Some(i + 1);
                        break;
                    }
                }
            }
            if let Some(boundary) = found {
                end = boundary;
            }
        }

        let slice_end = end.min(chars.len());
        let piece: String = chars
            .get(start..slice_end)
            .unwrap_or_default()
            .iter()
            .collect::<String>()
            .trim()
            .to_string();
        if !piece.is_empty() {
            chunks.push(ChunkPiece { text: piece, index });
            index += 1;
        }

        start = end.saturating_sub(overlap).max(start + 1);
        if start >= chars.len() {
            break;
        }
    }

    chunks
}
