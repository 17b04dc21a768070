//! Semantic document splitter
//!
//! Targets `chunk_size` tokens per chunk with `chunk_overlap` tokens of
//! carry-forward. Prefers heading and paragraph boundaries, then sentence
//! boundaries; a sentence is only split mid-way when it alone exceeds the
//! chunk budget.

use crate::chunk::Chunk;
use crate::tokens::TokenCounterRef;

/// Splitter configuration
#[derive(Debug, Clone, Copy)]
pub struct DocumentSplitterConfig {
    /// Target chunk size in tokens
    pub chunk_size: usize,
    /// Tokens of trailing context carried into the next chunk
    pub chunk_overlap: usize,
}

impl Default for DocumentSplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }
}

/// Splits prose documents into token-budgeted chunks
pub struct DocumentSplitter {
    config: DocumentSplitterConfig,
    counter: TokenCounterRef,
}

impl DocumentSplitter {
    /// Create a splitter with the given budget and token counter
    pub fn new(config: DocumentSplitterConfig, counter: TokenCounterRef) -> Self {
        Self { config, counter }
    }

    /// Split `content` into chunks attributed to `source_path`
    pub fn split(&self, source_path: &str, content: &str) -> Vec<Chunk> {
        let blocks = split_blocks(content);
        if blocks.is_empty() {
            return Vec::new();
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0;

        for block in blocks {
            let block_tokens = self.counter.count(&block);

            // A heading always starts a fresh chunk so sections stay whole.
            let is_heading = block.trim_start().starts_with('#');
            if is_heading && !current.is_empty() {
                self.flush(source_path, &mut chunks, &mut current, &mut current_tokens);
            }

            if current_tokens + block_tokens <= self.config.chunk_size {
                push_block(&mut current, &block);
                current_tokens += block_tokens;
                continue;
            }

            // Block doesn't fit. Flush what we have, then place the block -
            // splitting it by sentences when it alone exceeds the budget.
            if !current.is_empty() {
                self.flush(source_path, &mut chunks, &mut current, &mut current_tokens);
            }

            if block_tokens <= self.config.chunk_size {
                push_block(&mut current, &block);
                current_tokens = block_tokens;
            } else {
                self.split_oversized_block(source_path, &block, &mut chunks, &mut current, &mut current_tokens);
            }
        }

        if !current.trim().is_empty() {
            let index = chunks.len();
            chunks.push(Chunk::document(source_path, index, current.trim_end()));
        }

        chunks
    }

    /// Flush the accumulator into a chunk and seed the next with overlap
    fn flush(
        &self,
        source_path: &str,
        chunks: &mut Vec<Chunk>,
        current: &mut String,
        current_tokens: &mut usize,
    ) {
        if current.trim().is_empty() {
            current.clear();
            *current_tokens = 0;
            return;
        }
        let index = chunks.len();
        let text = current.trim_end().to_string();
        let overlap = self.tail_overlap(&text);
        chunks.push(Chunk::document(source_path, index, text));
        current.clear();
        *current_tokens = 0;
        if !overlap.is_empty() {
            current.push_str(&overlap);
            *current_tokens = self.counter.count(current);
        }
    }

    /// Trailing sentences of `text` worth up to `chunk_overlap` tokens
    fn tail_overlap(&self, text: &str) -> String {
        if self.config.chunk_overlap == 0 {
            return String::new();
        }
        let sentences = split_sentences(text);
        let mut taken: Vec<&str> = Vec::new();
        let mut tokens = 0;
        for sentence in sentences.iter().rev() {
            let count = self.counter.count(sentence);
            if tokens + count > self.config.chunk_overlap {
                break;
            }
            taken.push(sentence);
            tokens += count;
        }
        taken.reverse();
        taken.join(" ")
    }

    /// Sentence-split a block that exceeds the chunk budget on its own
    fn split_oversized_block(
        &self,
        source_path: &str,
        block: &str,
        chunks: &mut Vec<Chunk>,
        current: &mut String,
        current_tokens: &mut usize,
    ) {
        for sentence in split_sentences(block) {
            let sentence_tokens = self.counter.count(&sentence);
            if *current_tokens + sentence_tokens > self.config.chunk_size && !current.is_empty() {
                self.flush(source_path, chunks, current, current_tokens);
            }

            if sentence_tokens <= self.config.chunk_size {
                push_block(current, &sentence);
                *current_tokens += sentence_tokens;
            } else {
                // Single sentence over the budget: hard-split by words.
                for piece in split_by_words(&sentence, self.config.chunk_size, &self.counter) {
                    if !current.is_empty() {
                        self.flush(source_path, chunks, current, current_tokens);
                    }
                    push_block(current, &piece);
                    *current_tokens = self.counter.count(current);
                }
            }
        }
    }
}

fn push_block(current: &mut String, block: &str) {
    if !current.is_empty() {
        current.push_str("\n\n");
    }
    current.push_str(block.trim_end());
}

/// Split a document into heading/paragraph blocks
fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        let is_heading = line.trim_start().starts_with('#');
        let is_blank = line.trim().is_empty();

        if is_blank || is_heading {
            if !current.trim().is_empty() {
                blocks.push(current.trim_end().to_string());
            }
            current.clear();
        }
        if is_heading {
            blocks.push(line.trim_end().to_string());
        } else if !is_blank {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        blocks.push(current.trim_end().to_string());
    }
    blocks
}

/// Split a block into sentences on `. ! ?` followed by whitespace
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if chars.peek().is_none_or(|next| next.is_whitespace()) {
                let sentence = current.trim().to_string();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                current.clear();
            }
        }
    }
    let rest = current.trim().to_string();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Hard word-split for a sentence longer than the chunk budget
fn split_by_words(sentence: &str, budget: usize, counter: &TokenCounterRef) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut tokens = 0;
    for word in sentence.split_whitespace() {
        let word_tokens = counter.count(word).max(1);
        if tokens + word_tokens > budget && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            tokens = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        tokens += word_tokens;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::HeuristicCounter;
    use std::sync::Arc;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> DocumentSplitter {
        DocumentSplitter::new(
            DocumentSplitterConfig {
                chunk_size,
                chunk_overlap,
            },
            Arc::new(HeuristicCounter::new("test")),
        )
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunks = splitter(100, 0).split("empty.md", "");
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunks = splitter(100, 0).split("a.md", "Just one paragraph here.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_id, "a.md#0");
    }

    #[test]
    fn headings_start_new_chunks() {
        let doc = "# First\n\nBody of the first section with enough words to matter.\n\n# Second\n\nBody of the second section.";
        let chunks = splitter(20, 0).split("doc.md", doc);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].text.contains("# First"));
        assert!(chunks.iter().any(|c| c.text.contains("# Second")));
        // No chunk mixes both sections
        assert!(!chunks.iter().any(|c| c.text.contains("# First") && c.text.contains("# Second")));
    }

    #[test]
    fn chunk_indices_are_sequential() {
        let doc = "one two three four five six seven eight nine ten. ".repeat(30);
        let chunks = splitter(25, 5).split("big.md", &doc);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn never_splits_mid_sentence_when_avoidable() {
        let doc = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu.";
        let chunks = splitter(8, 0).split("s.md", doc);
        for chunk in &chunks {
            let text = chunk.text.trim();
            assert!(
                text.ends_with('.') || text.ends_with('!') || text.ends_with('?'),
                "chunk should end at a sentence boundary: {text:?}"
            );
        }
    }

    #[test]
    fn overlap_carries_trailing_sentence() {
        let doc = "First sentence here. Second sentence follows. Third sentence closes. Fourth one extends. Fifth one ends.";
        let chunks = splitter(12, 6).split("o.md", doc);
        assert!(chunks.len() > 1);
        // Some chunk after the first starts with text from the previous chunk's tail
        let any_overlap = chunks.windows(2).any(|pair| {
            let prev_tail = split_sentences(&pair[0].text).pop().unwrap_or_default();
            pair[1].text.starts_with(&prev_tail)
        });
        assert!(any_overlap, "expected sentence carry-forward between chunks");
    }
}
