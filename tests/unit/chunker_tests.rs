/*!
 * Tests for chapter chunking
 */

use std::sync::Arc;

use booktrans::translation::chunker::Chunker;

use crate::common::{WordCounter, wordy_text};

fn chunker() -> Chunker {
    Chunker::new(Arc::new(WordCounter))
}

#[test]
fn test_split_withManyLines_shouldKeepEveryChunkWithinBudget() {
    let text = wordy_text(40, 7, "x", &[]);

    let chunks = chunker().split(3, &text, 50);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.token_count <= 50, "chunk {} has {} tokens", chunk.sequence_index, chunk.token_count);
        assert_eq!(chunk.chapter_number, 3);
    }
}

#[test]
fn test_split_withLineBoundaries_shouldRejoinToOriginalText() {
    let text = wordy_text(25, 4, "m", &[0, 12, 24]);

    let chunks = chunker().split(1, &text, 30);
    let rejoined = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");

    assert_eq!(rejoined, text);
}

#[test]
fn test_split_shouldNumberChunksFromZero() {
    let text = wordy_text(10, 5, "x", &[]);

    let chunks = chunker().split(1, &text, 10);

    let indexes: Vec<usize> = chunks.iter().map(|c| c.sequence_index).collect();
    assert_eq!(indexes, (0..chunks.len()).collect::<Vec<_>>());
}

#[test]
fn test_split_withParagraphs_shouldBreakAtBlankLineAndTrim() {
    let chunks = chunker().split(1, "para one\n\npara two", 2);

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["para one", "para two"]);
}

#[test]
fn test_split_withWhitespaceOnlyInput_shouldYieldNoChunks() {
    assert!(chunker().split(1, " \n\n \t\n", 10).is_empty());
}

#[test]
fn test_split_calledTwice_shouldYieldIdenticalChunks() {
    let text = wordy_text(30, 6, "アキラ", &[3, 17]);
    let chunker = chunker();

    assert_eq!(chunker.split(2, &text, 40), chunker.split(2, &text, 40));
}
