use sha2::{Digest, Sha256};

use crate::models::DocumentChunk;

pub const MAX_CHUNK_CHARS: usize = 1_000;
pub const CHUNK_OVERLAP_CHARS: usize = 200;

/// Vector-store metadata size limit, in bytes, applied to the stored copy
/// of each chunk's text.
pub const METADATA_TEXT_BUDGET: usize = 36_000;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: MAX_CHUNK_CHARS,
            overlap_chars: CHUNK_OVERLAP_CHARS,
        }
    }
}

/// Newlines are removed before splitting, so chunks never carry paragraph
/// boundaries.
pub fn strip_newlines(text: &str) -> String {
    text.replace('\n', "")
}

/// Split one page of extracted text into overlapping windows. Each chunk is
/// at most `max_chars` characters and shares exactly `overlap_chars` with
/// its predecessor; the final chunk may be shorter. Every chunk carries the
/// page number it came from.
pub fn split_page(text: &str, page_number: u32, config: ChunkingConfig) -> Vec<DocumentChunk> {
    let cleaned = strip_newlines(text);
    let chars: Vec<char> = cleaned.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + config.max_chars).min(chars.len());
        chunks.push(DocumentChunk {
            text: chars[start..end].iter().collect(),
            page_number,
        });
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Content-hash id for a chunk. Identical text in different namespaces is
/// allowed to share an id because namespaces are disjoint.
pub fn chunk_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate to at most `max_bytes` bytes without splitting a codepoint.
/// The result is always valid UTF-8 and the function is idempotent.
pub fn truncate_utf8_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkingConfig {
        ChunkingConfig::default()
    }

    #[test]
    fn short_page_is_a_single_chunk() {
        let chunks = split_page("hello world", 3, config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].page_number, 3);
    }

    #[test]
    fn page_of_2500_chars_splits_into_three_chunks() {
        let text: String = std::iter::repeat("abcde").take(500).collect();
        assert_eq!(text.chars().count(), 2_500);

        let chunks = split_page(&text, 1, config());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.chars().count(), 1_000);
        assert_eq!(chunks[1].text.chars().count(), 1_000);
        assert_eq!(chunks[2].text.chars().count(), 900);
        assert!(chunks.iter().all(|chunk| chunk.page_number == 1));
    }

    #[test]
    fn consecutive_chunks_overlap_by_exactly_200_chars() {
        let text: String = (0..2_500)
            .map(|index| char::from(b'a' + (index % 26) as u8))
            .collect();

        let chunks = split_page(&text, 1, config());
        for pair in chunks.windows(2) {
            let left: Vec<char> = pair[0].text.chars().collect();
            let right: Vec<char> = pair[1].text.chars().collect();
            assert_eq!(&left[left.len() - 200..], &right[..200]);
        }
    }

    #[test]
    fn overlap_stripped_concatenation_reconstructs_the_input() {
        let text: String = (0..3_141)
            .map(|index| char::from(b'a' + (index % 26) as u8))
            .collect();
        let cleaned = strip_newlines(&text);

        let chunks = split_page(&text, 1, config());
        let mut rebuilt = String::new();
        for (index, chunk) in chunks.iter().enumerate() {
            if index == 0 {
                rebuilt.push_str(&chunk.text);
            } else {
                rebuilt.extend(chunk.text.chars().skip(CHUNK_OVERLAP_CHARS));
            }
        }
        assert_eq!(rebuilt, cleaned);
    }

    #[test]
    fn newlines_are_stripped_before_splitting() {
        let chunks = split_page("line one\nline two\n", 1, config());
        assert_eq!(chunks[0].text, "line oneline two");
    }

    #[test]
    fn chunk_id_is_stable_per_text() {
        assert_eq!(chunk_id("same"), chunk_id("same"));
        assert_ne!(chunk_id("same"), chunk_id("other"));
        assert_eq!(chunk_id("same").len(), 64);
    }

    #[test]
    fn byte_truncation_respects_codepoint_boundaries() {
        // "é" is two bytes; cutting at 1 must not split it.
        let truncated = truncate_utf8_bytes("é", 1);
        assert_eq!(truncated, "");

        let truncated = truncate_utf8_bytes("aé", 2);
        assert_eq!(truncated, "a");
        assert!(truncated.len() <= 2);
    }

    #[test]
    fn byte_truncation_is_idempotent() {
        let input = "naïve façade — ☃ snowman";
        let once = truncate_utf8_bytes(input, 10);
        let twice = truncate_utf8_bytes(once, 10);
        assert_eq!(once, twice);
        assert!(once.len() <= 10);
    }
}
