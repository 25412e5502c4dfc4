//! Token budget reservation shared by every pipeline step.
//!
//! A call to the model must fit the system message, the instruction template, the payload, the
//! model's reply, and a safety cushion inside one context window. [`TokenBudget::usable`]
//! subtracts everything except the payload and returns what is left for chunk text.

use crate::config::Config;
use crate::processing::types::ChunkingError;
use crate::tokenizer::Tokenizer;

/// Fixed reservation parameters for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Model context window in tokens.
    pub context_limit: usize,
    /// Cushion kept free on top of the measured overhead.
    pub safety_margin: usize,
    /// Tokens reserved for the model's reply.
    pub max_output_tokens: usize,
}

impl TokenBudget {
    /// Budget for the configured model.
    pub fn from_config(config: &Config) -> Self {
        Self {
            context_limit: config.model_context_limit,
            safety_margin: config.token_safety_margin,
            max_output_tokens: config.completion_max_tokens,
        }
    }

    /// Tokens left for payload after reserving `overhead_tokens` of instructions.
    ///
    /// Fails with [`ChunkingError::InvalidBudget`] when nothing positive remains.
    pub fn usable(&self, overhead_tokens: usize) -> Result<usize, ChunkingError> {
        let reserved = overhead_tokens
            .saturating_add(self.safety_margin)
            .saturating_add(self.max_output_tokens);
        self.context_limit
            .checked_sub(reserved)
            .filter(|usable| *usable > 0)
            .ok_or(ChunkingError::InvalidBudget {
                context_limit: self.context_limit,
                reserved,
            })
    }

    /// Measure each overhead text with `tokenizer` and reserve the total.
    pub fn usable_for(
        &self,
        tokenizer: &dyn Tokenizer,
        overhead: &[&str],
    ) -> Result<usize, ChunkingError> {
        let overhead_tokens = overhead.iter().map(|text| tokenizer.count(text)).sum();
        let usable = self.usable(overhead_tokens)?;
        tracing::trace!(overhead_tokens, usable, "Reserved token budget");
        Ok(usable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::BpeTokenizer;

    const REFERENCE: TokenBudget = TokenBudget {
        context_limit: 16385,
        safety_margin: 1000,
        max_output_tokens: 1000,
    };

    #[test]
    fn usable_subtracts_every_reservation() {
        assert_eq!(REFERENCE.usable(385).expect("budget"), 14000);
    }

    #[test]
    fn exhausted_budget_is_rejected() {
        let error = REFERENCE.usable(14385).unwrap_err();
        assert!(matches!(
            error,
            ChunkingError::InvalidBudget {
                context_limit: 16385,
                reserved: 16385
            }
        ));
        assert!(REFERENCE.usable(usize::MAX).is_err());
    }

    #[test]
    fn usable_for_counts_overhead_with_tokenizer() {
        let tokenizer = BpeTokenizer::for_model("gpt-3.5-turbo-0125").expect("tokenizer");
        let system = "You extract outlines.";
        let template = "TASK: outline the text below.";
        let expected = 16385 - 2000 - tokenizer.count(system) - tokenizer.count(template);
        let usable = REFERENCE
            .usable_for(&tokenizer, &[system, template])
            .expect("budget");
        assert_eq!(usable, expected);
    }
}
