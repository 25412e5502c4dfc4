//! Token-window chunking and truncation helpers.
//!
//! The default strategy encodes the whole document once, slices the token stream into
//! contiguous windows of exactly `max_tokens` (the last may be shorter), and decodes each window
//! on its own. Boundaries ignore sentence structure and may split a multi-byte character; the
//! split bytes decode to U+FFFD. The semantic strategy delegates boundary selection to
//! `semchunk-rs` with the same token counter and re-windows any segment that overshoots.

use crate::config::ChunkStrategy;
use crate::processing::types::{Chunk, ChunkingError};
use crate::tokenizer::Tokenizer;
use semchunk_rs::Chunker;
use std::sync::Arc;

/// Split `text` into ordered chunks of at most `max_tokens` tokens.
///
/// Returns an empty vector for empty input and [`ChunkingError::InvalidBudget`] when
/// `max_tokens` is zero.
pub fn chunk_text(
    text: &str,
    max_tokens: usize,
    strategy: ChunkStrategy,
    tokenizer: &Arc<dyn Tokenizer>,
) -> Result<Vec<Chunk>, ChunkingError> {
    if max_tokens == 0 {
        return Err(ChunkingError::zero_budget());
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    match strategy {
        ChunkStrategy::Window => window_chunks(text, max_tokens, tokenizer.as_ref()),
        ChunkStrategy::Semantic => semantic_chunks(text, max_tokens, tokenizer),
    }
}

/// Slice the encoded token stream into contiguous windows and decode each one.
///
/// Produces exactly `ceil(tokens / max_tokens)` chunks.
pub fn window_chunks(
    text: &str,
    max_tokens: usize,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<Chunk>, ChunkingError> {
    if max_tokens == 0 {
        return Err(ChunkingError::zero_budget());
    }

    let tokens = tokenizer.encode(text);
    let chunks = tokens
        .chunks(max_tokens)
        .enumerate()
        .map(|(offset, window)| -> Result<Chunk, ChunkingError> {
            Ok(Chunk {
                index: offset + 1,
                text: tokenizer.decode_lossy(window)?,
                token_count: window.len(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        tokens = tokens.len(),
        max_tokens,
        chunks = chunks.len(),
        "Split document into token windows"
    );
    Ok(chunks)
}

fn semantic_chunks(
    text: &str,
    max_tokens: usize,
    tokenizer: &Arc<dyn Tokenizer>,
) -> Result<Vec<Chunk>, ChunkingError> {
    let counter = Arc::clone(tokenizer);
    let chunker = Chunker::new(
        max_tokens,
        Box::new(move |segment: &str| counter.count(segment)),
    );

    let mut chunks = Vec::new();
    for segment in chunker.chunk(text) {
        if segment.trim().is_empty() {
            continue;
        }
        let token_count = tokenizer.count(&segment);
        if token_count <= max_tokens {
            chunks.push(Chunk {
                index: 0,
                text: segment,
                token_count,
            });
            continue;
        }
        tracing::trace!(token_count, max_tokens, "Semantic segment over budget; re-windowing");
        chunks.extend(window_chunks(&segment, max_tokens, tokenizer.as_ref())?);
    }
    for (offset, chunk) in chunks.iter_mut().enumerate() {
        chunk.index = offset + 1;
    }

    tracing::debug!(
        max_tokens,
        chunks = chunks.len(),
        "Split document into semantic chunks"
    );
    Ok(chunks)
}

/// Cut `text` down to its first `max_tokens` tokens.
///
/// The cut lands on a token boundary and may fall mid-sentence or mid-character. Text already
/// within budget is returned unchanged.
pub fn truncate_to_tokens(
    text: &str,
    max_tokens: usize,
    tokenizer: &dyn Tokenizer,
) -> Result<String, ChunkingError> {
    let tokens = tokenizer.encode(text);
    if tokens.len() <= max_tokens {
        return Ok(text.to_string());
    }

    let prefix = tokenizer.decode_lossy(&tokens[..max_tokens])?;
    tracing::debug!(
        original_tokens = tokens.len(),
        kept_tokens = max_tokens,
        "Truncated text to token budget"
    );
    Ok(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{BpeTokenizer, TokenId, TokenizerError};

    fn bpe() -> Arc<dyn Tokenizer> {
        Arc::new(BpeTokenizer::for_model("gpt-3.5-turbo-0125").expect("tokenizer"))
    }

    /// One token per byte; strict decoding fails when the bytes are not valid UTF-8.
    struct ByteTokenizer;

    impl Tokenizer for ByteTokenizer {
        fn encode(&self, text: &str) -> Vec<TokenId> {
            text.bytes().map(TokenId::from).collect()
        }

        fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
            String::from_utf8(bytes_of(tokens)).map_err(|error| TokenizerError::Decode {
                count: tokens.len(),
                message: error.to_string(),
            })
        }

        fn decode_lossy(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
            Ok(String::from_utf8_lossy(&bytes_of(tokens)).into_owned())
        }
    }

    fn bytes_of(tokens: &[TokenId]) -> Vec<u8> {
        tokens.iter().map(|token| *token as u8).collect()
    }

    const SAMPLE: &str = "Operating systems manage hardware resources. Processes are programs in \
        execution, and threads share an address space. Scheduling decides which process runs next, \
        while memory management maps virtual pages onto physical frames.";

    const MULTI_BYTE: &str = "I like 🦀 and 𝔘𝔫𝔦𝔠𝔬𝔡𝔢 and 龘靐齉";

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = chunk_text("", 10, ChunkStrategy::Window, &bpe()).expect("chunks");
        assert!(chunks.is_empty());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let error = chunk_text("hello", 0, ChunkStrategy::Window, &bpe()).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidBudget { .. }));
    }

    #[test]
    fn windows_respect_budget_and_count() {
        let tokenizer = bpe();
        for text in [SAMPLE, MULTI_BYTE] {
            let total = tokenizer.count(text);
            for max_tokens in [1, 2, 3, 5, 7, 16, total, total + 5] {
                let chunks = chunk_text(text, max_tokens, ChunkStrategy::Window, &tokenizer)
                    .expect("chunks");
                assert_eq!(chunks.len(), total.div_ceil(max_tokens), "max_tokens={max_tokens}");
                let covered: usize = chunks.iter().map(|chunk| chunk.token_count).sum();
                assert_eq!(covered, total);
                for chunk in &chunks {
                    assert!(chunk.token_count <= max_tokens);
                }
            }
        }
    }

    #[test]
    fn windows_reassemble_to_full_decode() {
        let tokenizer = bpe();
        let chunks = chunk_text(SAMPLE, 5, ChunkStrategy::Window, &tokenizer).expect("chunks");
        let joined: String = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let full = tokenizer
            .decode(&tokenizer.encode(SAMPLE))
            .expect("full decode");
        assert_eq!(joined, full);
        let indices: Vec<usize> = chunks.iter().map(|chunk| chunk.index).collect();
        assert_eq!(indices, (1..=chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn split_characters_decode_as_replacement() {
        // "é" is two bytes, so the first 2-token window ends halfway through it.
        let chunks = window_chunks("aé b", 2, &ByteTokenizer).expect("chunks");
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a\u{FFFD}", "\u{FFFD} ", "b"]);
    }

    #[test]
    fn semantic_chunks_stay_within_budget() {
        let tokenizer = bpe();
        let chunks = chunk_text(SAMPLE, 12, ChunkStrategy::Semantic, &tokenizer).expect("chunks");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 12, "{:?}", chunk.text);
            assert!(!chunk.text.trim().is_empty());
        }
        let indices: Vec<usize> = chunks.iter().map(|chunk| chunk.index).collect();
        assert_eq!(indices, (1..=chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn semantic_chunks_rewindow_an_unbreakable_run() {
        let tokenizer = bpe();
        let run = "x".repeat(400);
        let chunks = chunk_text(&run, 5, ChunkStrategy::Semantic, &tokenizer).expect("chunks");
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.token_count <= 5);
        }
        assert_eq!(chunks.last().map(|chunk| chunk.index), Some(chunks.len()));
    }

    #[test]
    fn truncate_keeps_short_text_and_cuts_long_text() {
        let tokenizer = bpe();
        assert_eq!(
            truncate_to_tokens("short answer", 50, tokenizer.as_ref()).expect("truncate"),
            "short answer"
        );

        let truncated = truncate_to_tokens(SAMPLE, 6, tokenizer.as_ref()).expect("truncate");
        assert!(tokenizer.count(&truncated) <= 6);
        assert!(!truncated.is_empty());
        assert!(SAMPLE.starts_with(&truncated));
        assert_eq!(truncate_to_tokens(SAMPLE, 0, tokenizer.as_ref()).expect("truncate"), "");
    }

    #[test]
    fn truncate_through_a_character_does_not_fail() {
        let tokenizer = bpe();
        let total = tokenizer.count(MULTI_BYTE);
        for max_tokens in 1..total {
            truncate_to_tokens(MULTI_BYTE, max_tokens, tokenizer.as_ref()).expect("truncate");
        }
    }
}
