//! Core data types and error definitions for the digest pipeline.

use crate::completion::CompletionError;
use crate::tokenizer::TokenizerError;
use thiserror::Error;

/// Errors produced while sizing budgets or turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The caller asked for a non-positive token budget.
    #[error("token budget must be greater than zero (context {context_limit}, reserved {reserved})")]
    InvalidBudget {
        /// Context window the budget was carved from.
        context_limit: usize,
        /// Tokens already claimed by instructions, output, and margin.
        reserved: usize,
    },
    /// Tokenizer could not decode a window back into text.
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

impl ChunkingError {
    /// Budget error for an explicit chunk size of zero.
    pub(crate) fn zero_budget() -> Self {
        Self::InvalidBudget {
            context_limit: 0,
            reserved: 0,
        }
    }
}

/// Errors surfaced to callers of [`crate::processing::DigestApi`].
#[derive(Debug, Error)]
pub enum DigestError {
    /// Budgeting or chunking could not proceed.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// The document key is unknown to the store.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    /// The question was blank.
    #[error("Question must not be empty")]
    InvalidQuestion,
    /// Every chunk's completion call failed.
    #[error("All {failed} completion calls failed: {source}")]
    Upstream {
        /// Number of failed chunk calls.
        failed: usize,
        /// Last failure reported by the completion client.
        #[source]
        source: CompletionError,
    },
    /// Unexpected internal failure.
    #[error("Pipeline failed: {0}")]
    Pipeline(String),
}

/// One slice of a document's token stream, decoded back to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position within the document.
    pub index: usize,
    /// Decoded chunk text.
    pub text: String,
    /// Tokens the chunk occupies.
    pub token_count: usize,
}

/// Result of a completed `summarize` or `answer` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestOutcome {
    /// Rendered outline or refined answer.
    pub text: String,
    /// Number of chunks the document was split into.
    pub chunk_count: usize,
    /// Token budget used per chunk.
    pub chunk_size: usize,
    /// Chunks whose completion produced non-empty text.
    pub contributed: usize,
    /// Chunks whose completion call failed.
    pub failed: usize,
}

impl DigestOutcome {
    /// Wrap the text for HTML preformatted display.
    pub fn preformatted(&self) -> String {
        let mut escaped = String::with_capacity(self.text.len() + 11);
        escaped.push_str("<pre>");
        for ch in self.text.chars() {
            match ch {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                other => escaped.push(other),
            }
        }
        escaped.push_str("</pre>");
        escaped
    }
}
