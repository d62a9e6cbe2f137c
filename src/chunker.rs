//! Greedy sentence packing into model-sized chunks.
//!
//! Sentences are appended to the current chunk while the chunk still fits the
//! model input. In [`ChunkMode::Lossless`] a chunk fits when its encoded length,
//! special tokens included, is at most [`MAX_INPUT_TOKENS`], so the length guard
//! never rejects a packed chunk. [`ChunkMode::Reference`] compares content
//! tokens only and requires them to stay below the limit.

use crate::guard::MAX_INPUT_TOKENS;
use crate::models::{ModelError, TokenCount};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use unicode_segmentation::UnicodeSegmentation;

/// How the chunker treats the sentence that overflows a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    /// The overflowing sentence starts the next chunk and the trailing chunk
    /// is emitted.
    #[default]
    Lossless,
    /// Legacy packing: the overflowing sentence is dropped
    /// and the trailing chunk is never emitted.
    Reference,
}

impl ChunkMode {
    /// Whether a chunk of `tokens` content tokens fits one model input
    fn fits(self, tokens: usize, overhead: usize) -> bool {
        match self {
            ChunkMode::Lossless => tokens + overhead <= MAX_INPUT_TOKENS,
            ChunkMode::Reference => tokens < MAX_INPUT_TOKENS,
        }
    }
}

/// Lazily split `text` into trimmed, non-empty sentences.
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Pack the sentences of `text` into chunks, each sentence followed by a space.
pub fn chunk<C>(text: &str, counter: &C, mode: ChunkMode) -> Result<Vec<String>, ModelError>
where
    C: TokenCount + ?Sized,
{
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0;
    let overhead = counter.special_token_overhead();

    for sentence in sentences(text) {
        let sentence_tokens = counter.token_count(sentence)?;

        if mode.fits(current_tokens + sentence_tokens, overhead) {
            append(&mut current, sentence);
            current_tokens = counter.token_count(&current)?;
            continue;
        }

        match mode {
            ChunkMode::Reference => {
                trace!(sentence_tokens, "dropping overflowing sentence");
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            ChunkMode::Lossless => {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                append(&mut current, sentence);
                current_tokens = counter.token_count(&current)?;
            }
        }
    }

    if mode == ChunkMode::Lossless && !current.is_empty() {
        chunks.push(current);
    }

    debug!(chunks = chunks.len(), ?mode, "chunked text");
    Ok(chunks)
}

fn append(chunk: &mut String, sentence: &str) {
    chunk.push_str(sentence);
    chunk.push(' ');
}
