//! Model-specific token accounting.
//!
//! Budgets are only exact when they are counted with the vocabulary the completion model uses,
//! so the adapter resolves the encoding from the configured model name. Resolution prefers the
//! model lookup in `tiktoken-rs`, then an explicit encoding name, and finally falls back to
//! `cl100k_base` with a warning.

use anyhow::Error as EncodingError;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

/// Identifier of a single token in the model vocabulary.
pub type TokenId = u32;

/// Errors raised while loading a vocabulary or decoding tokens.
#[derive(Debug, Error)]
pub enum TokenizerError {
    /// No encoding could be loaded for the model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Encoding {
        /// Model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: EncodingError,
    },
    /// The token sequence does not decode to valid UTF-8 text.
    #[error("failed to decode {count} tokens: {message}")]
    Decode {
        /// Number of tokens in the rejected sequence.
        count: usize,
        /// Diagnostic from the tokenizer library.
        message: String,
    },
}

/// Counts, encodes, and decodes text in model token units.
pub trait Tokenizer: Send + Sync {
    /// Encode text into an ordered sequence of token ids.
    fn encode(&self, text: &str) -> Vec<TokenId>;

    /// Decode a token sequence back into text.
    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError>;

    /// Decode a token sequence that may start or end inside a multi-byte character.
    ///
    /// Incomplete byte sequences become U+FFFD instead of failing.
    fn decode_lossy(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        self.decode(tokens)
    }

    /// Number of tokens `text` occupies.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Byte-pair tokenizer backed by `tiktoken-rs`.
#[derive(Clone)]
pub struct BpeTokenizer {
    model: String,
    encoding: Arc<CoreBPE>,
}

impl BpeTokenizer {
    /// Load the vocabulary matching `model`.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let normalized = model.trim();
        let target = if normalized.is_empty() {
            "cl100k_base"
        } else {
            normalized
        };
        let encoding = resolve_encoding(target).map_err(|source| TokenizerError::Encoding {
            model: target.to_string(),
            source,
        })?;
        Ok(Self {
            model: target.to_string(),
            encoding: Arc::new(encoding),
        })
    }

    /// Model name the vocabulary was resolved for.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.encoding.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        self.encoding
            .decode(tokens)
            .map_err(|error| TokenizerError::Decode {
                count: tokens.len(),
                message: error.to_string(),
            })
    }

    fn decode_lossy(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        let bytes = self
            .encoding
            .decode_bytes(tokens)
            .map_err(|error| TokenizerError::Decode {
                count: tokens.len(),
                message: error.to_string(),
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for BpeTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BpeTokenizer")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, EncodingError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding.clone()),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding; token budgets may be inexact"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, EncodingError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}
