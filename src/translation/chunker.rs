/*!
 * Token-bounded chunking of chapter text.
 *
 * Chapters are split on line boundaries and packed greedily so that each
 * chunk stays under a token budget. A single line that alone exceeds the
 * budget becomes its own chunk; lines are never split.
 */

use anyhow::{Result, anyhow};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Encoding used when none is configured
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Counts tokens for a piece of text.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens `text` encodes to
    fn count(&self, text: &str) -> usize;

    /// Name of the encoding, for logging
    fn encoding_name(&self) -> &str {
        "custom"
    }
}

/// BPE token counter backed by tiktoken encodings
pub struct TiktokenCounter {
    encoding: String,
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Load a named encoding (`cl100k_base`, `o200k_base`, `p50k_base`, `r50k_base`)
    pub fn new(encoding: &str) -> Result<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => return Err(anyhow!("Unknown token encoding: {}", other)),
        }
        .map_err(|e| anyhow!("Failed to load token encoding {}: {}", encoding, e))?;

        Ok(Self {
            encoding: encoding.to_string(),
            bpe,
        })
    }
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn encoding_name(&self) -> &str {
        &self.encoding
    }
}

/// A contiguous slice of a chapter's plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chapter_number: u32,
    /// Position within the chapter, starting at 0
    pub sequence_index: usize,
    pub text: String,
    pub token_count: usize,
}

/// Splits chapter text into token-bounded chunks
#[derive(Clone)]
pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
}

impl Chunker {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Split `text` into ordered chunks of at most `max_tokens` tokens.
    ///
    /// Lines are accumulated with their trailing newline. When adding the next
    /// line would push the buffer over the budget, the buffer is closed and the
    /// line starts a new one. Chunks are whitespace-trimmed and blank chunks are
    /// dropped, so empty input yields no chunks.
    pub fn split(&self, chapter_number: u32, text: &str, max_tokens: usize) -> Vec<Chunk> {
        let mut pieces: Vec<String> = Vec::new();
        let mut buffer = String::new();

        for line in text.split('\n') {
            let candidate_tokens = self.counter.count(&format!("{}{}\n", buffer, line));

            if candidate_tokens > max_tokens && !buffer.trim().is_empty() {
                pieces.push(buffer.trim().to_string());
                buffer.clear();
            } else if candidate_tokens > max_tokens {
                // Nothing worth keeping before an oversized line
                buffer.clear();
            }

            buffer.push_str(line);
            buffer.push('\n');
        }

        if !buffer.trim().is_empty() {
            pieces.push(buffer.trim().to_string());
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(sequence_index, text)| Chunk {
                chapter_number,
                sequence_index,
                token_count: self.counter.count(&text),
                text,
            })
            .collect()
    }
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("encoding", &self.counter.encoding_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts whitespace separated words, which keeps budgets easy to reason about
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn chunker() -> Chunker {
        Chunker::new(Arc::new(WordCounter))
    }

    fn line_of(words: usize, tag: usize) -> String {
        (0..words).map(|i| format!("w{}_{}", tag, i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_split_withEmptyInput_shouldYieldNoChunks() {
        assert!(chunker().split(1, "", 10).is_empty());
        assert!(chunker().split(1, "\n\n   \n", 10).is_empty());
    }

    #[test]
    fn test_split_withSmallText_shouldYieldSingleTrimmedChunk() {
        let chunks = chunker().split(3, "  one two\nthree\n", 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "one two\nthree");
        assert_eq!(chunks[0].chapter_number, 3);
        assert_eq!(chunks[0].token_count, 3);
    }

    #[test]
    fn test_split_withBudgetOverflow_shouldCloseBufferBeforeLine() {
        let text = "a b c\nd e f\ng h";
        let chunks = chunker().split(1, text, 6);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c\nd e f", "g h"]);
        assert_eq!(chunks[1].sequence_index, 1);
    }

    #[test]
    fn test_split_withOversizedLine_shouldKeepLineWhole() {
        let long = line_of(20, 0);
        let text = format!("{}\nshort line", long);
        let chunks = chunker().split(1, &text, 5);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, long);
        assert_eq!(chunks[0].token_count, 20);
        assert_eq!(chunks[1].text, "short line");
    }

    #[test]
    fn test_split_withLargeChapter_shouldProduceTwoChunksUnderBudget() {
        let lines: Vec<String> = (0..95).map(|i| line_of(100, i)).collect();
        let text = lines.join("\n");
        let chunks = chunker().split(7, &text, 7000);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].token_count, 7000);
        assert_eq!(chunks[1].token_count, 2500);
        assert!(chunks.iter().all(|c| c.token_count <= 7000));
    }

    #[test]
    fn test_split_concatenation_shouldPreserveAllWordsInOrder() {
        let lines: Vec<String> = (0..30).map(|i| line_of(7, i)).collect();
        let text = lines.join("\n");
        let chunks = chunker().split(1, &text, 20);

        let rejoined: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(rejoined, original);

        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, index);
            assert!(chunk.token_count <= 20);
        }
    }

    #[test]
    fn test_tiktokenCounter_withCl100k_shouldCountKnownText() {
        let counter = TiktokenCounter::new(DEFAULT_ENCODING).unwrap();
        assert_eq!(counter.count("hello world"), 2);
        assert_eq!(counter.encoding_name(), "cl100k_base");
    }

    #[test]
    fn test_tiktokenCounter_withUnknownEncoding_shouldFail() {
        assert!(TiktokenCounter::new("nonexistent").is_err());
    }
}
