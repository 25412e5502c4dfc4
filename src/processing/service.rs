//! Digest service coordinating chunking, completion calls, merging, and refinement.

use crate::{
    completion::{CompletionClient, CompletionError, build_completion_client},
    config::{ChunkStrategy, Config, HeadingContext},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        budget::TokenBudget,
        chunking::{chunk_text, truncate_to_tokens},
        outline::{HeadingTrail, OutlineMerger},
        prompts::{SYSTEM_MESSAGE, answer_prompt, extraction_prompt, refinement_prompt},
        types::{Chunk, ChunkingError, DigestError, DigestOutcome},
    },
    store::{DocumentStore, StoreError},
    tokenizer::{BpeTokenizer, Tokenizer},
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use std::sync::Arc;

/// Knobs that shape a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Context reservation for the target model.
    pub budget: TokenBudget,
    /// How chunk boundaries are chosen.
    pub chunk_strategy: ChunkStrategy,
    /// Which headings are carried between extraction calls.
    pub heading_context: HeadingContext,
    /// Per-chunk answer calls allowed in flight at once.
    pub answer_concurrency: usize,
}

impl PipelineSettings {
    /// Settings for the configured model and pipeline options.
    pub fn from_config(config: &Config) -> Self {
        Self {
            budget: TokenBudget::from_config(config),
            chunk_strategy: config.chunk_strategy,
            heading_context: config.heading_context,
            answer_concurrency: config.answer_concurrency.max(1),
        }
    }
}

/// Abstraction over the digest pipelines used by external surfaces.
#[async_trait]
pub trait DigestApi: Send + Sync {
    /// Produce a merged hierarchical outline of the stored document.
    ///
    /// The outcome text is the plain rendered outline. Display surfaces wrap it with
    /// [`DigestOutcome::preformatted`], which yields the escaped `<pre>` block.
    async fn summarize(&self, document_key: &str) -> Result<DigestOutcome, DigestError>;

    /// Answer `question` using only the stored document's content.
    async fn answer(
        &self,
        document_key: &str,
        question: &str,
    ) -> Result<DigestOutcome, DigestError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs the outline and question pipelines over documents from a [`DocumentStore`].
///
/// The service owns long-lived handles to the completion client, tokenizer, and store so that
/// repeated runs share connections and vocabulary tables. Every run is independent; the only
/// shared state is the read-only document text and the metrics counters.
pub struct DigestService {
    completion: Box<dyn CompletionClient + Send + Sync>,
    store: Arc<dyn DocumentStore>,
    tokenizer: Arc<dyn Tokenizer>,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

/// Per-chunk failures absorbed during a run.
#[derive(Default)]
struct FailureTally {
    failed: usize,
    last: Option<CompletionError>,
}

impl FailureTally {
    fn record(&mut self, chunk: &Chunk, error: CompletionError) {
        tracing::warn!(
            chunk = chunk.index,
            error = %error,
            "Completion failed; chunk contributes nothing"
        );
        self.failed += 1;
        self.last = Some(error);
    }

    /// Error out only when every one of `total` chunks failed.
    fn check(&mut self, total: usize) -> Result<(), DigestError> {
        if total == 0 || self.failed < total {
            return Ok(());
        }
        match self.last.take() {
            Some(source) => Err(DigestError::Upstream {
                failed: self.failed,
                source,
            }),
            None => Ok(()),
        }
    }
}

impl DigestService {
    /// Assemble a service from explicit components.
    pub fn new(
        completion: Box<dyn CompletionClient + Send + Sync>,
        store: Arc<dyn DocumentStore>,
        tokenizer: Arc<dyn Tokenizer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            completion,
            store,
            tokenizer,
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build the configured completion client and tokenizer around `store`.
    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> Result<Self, DigestError> {
        tracing::info!(model = %config.completion_model, "Initializing tokenizer");
        let tokenizer =
            BpeTokenizer::for_model(&config.completion_model).map_err(ChunkingError::from)?;
        let completion = build_completion_client(config)
            .map_err(|error| DigestError::Pipeline(format!("completion client: {error}")))?;
        tracing::info!(provider = ?config.completion_provider, "Completion client initialized");

        Ok(Self::new(
            completion,
            store,
            Arc::new(tokenizer),
            PipelineSettings::from_config(config),
        ))
    }

    /// Outline already extracted `text`.
    pub async fn summarize_text(&self, text: &str) -> Result<DigestOutcome, DigestError> {
        let chunk_size = self.chunk_budget()?;
        let chunks = chunk_text(
            text,
            chunk_size,
            self.settings.chunk_strategy,
            &self.tokenizer,
        )?;
        let total = chunks.len();
        tracing::info!(chunks = total, chunk_size, "Processing document");

        let mut merger = OutlineMerger::default();
        let cumulative = self.settings.heading_context == HeadingContext::Cumulative;
        let mut trail = HeadingTrail::new(cumulative);
        let mut failures = FailureTally::default();
        let mut contributed = 0;

        for chunk in &chunks {
            tracing::info!(chunk = chunk.index, chunks = total, "Processing chunk");
            let context = trail.context();
            let prompt = extraction_prompt(&chunk.text, context.as_deref());
            match self.completion.complete(SYSTEM_MESSAGE, &prompt).await {
                Ok(outline) if !outline.trim().is_empty() => {
                    merger.push_fragment(&outline);
                    trail.record(&outline);
                    contributed += 1;
                }
                Ok(_) => tracing::debug!(chunk = chunk.index, "Chunk produced no outline"),
                Err(error) => failures.record(chunk, error),
            }
        }

        failures.check(total)?;
        let rendered = merger.finish().render();

        self.metrics
            .record_summary(total as u64, failures.failed as u64, chunk_size as u64);
        tracing::info!(
            chunks = total,
            contributed,
            failed = failures.failed,
            "Outline assembled"
        );

        Ok(DigestOutcome {
            text: rendered,
            chunk_count: total,
            chunk_size,
            contributed,
            failed: failures.failed,
        })
    }

    /// Answer `question` against already extracted `text`.
    pub async fn answer_text(
        &self,
        question: &str,
        text: &str,
    ) -> Result<DigestOutcome, DigestError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DigestError::InvalidQuestion);
        }

        // Sized with the extraction template; the answer template is close enough in length.
        let chunk_size = self.chunk_budget()?;
        let chunks = chunk_text(
            text,
            chunk_size,
            self.settings.chunk_strategy,
            &self.tokenizer,
        )?;
        let total = chunks.len();
        tracing::info!(
            chunks = total,
            chunk_size,
            concurrency = self.settings.answer_concurrency,
            "Answering question"
        );

        let calls: Vec<_> = chunks
            .iter()
            .map(|chunk| self.answer_chunk(chunk, question, total))
            .collect();
        let replies: Vec<(&Chunk, Result<String, CompletionError>)> = stream::iter(calls)
            .buffered(self.settings.answer_concurrency.max(1))
            .collect()
            .await;

        let mut failures = FailureTally::default();
        let mut contributed = 0;
        let mut accumulated = String::new();
        for (chunk, reply) in replies {
            match reply {
                Ok(fragment) if !fragment.is_empty() => {
                    accumulated.push_str(&fragment);
                    contributed += 1;
                }
                Ok(_) => tracing::debug!(chunk = chunk.index, "Chunk produced no answer"),
                Err(error) => failures.record(chunk, error),
            }
        }
        failures.check(total)?;

        let refinement_budget = self.settings.budget.usable_for(
            self.tokenizer.as_ref(),
            &[SYSTEM_MESSAGE, &refinement_prompt("")],
        )?;
        let condensed =
            truncate_to_tokens(&accumulated, refinement_budget, self.tokenizer.as_ref())?;
        let refined = match self
            .completion
            .complete(SYSTEM_MESSAGE, &refinement_prompt(&condensed))
            .await
        {
            Ok(refined) => refined,
            Err(error) => {
                tracing::warn!(error = %error, "Refinement failed; returning assembled answer");
                condensed
            }
        };

        self.metrics
            .record_answer(total as u64, failures.failed as u64, chunk_size as u64);
        tracing::info!(
            chunks = total,
            contributed,
            failed = failures.failed,
            refinement_budget,
            "Answer refined"
        );

        Ok(DigestOutcome {
            text: refined,
            chunk_count: total,
            chunk_size,
            contributed,
            failed: failures.failed,
        })
    }

    async fn answer_chunk<'a>(
        &self,
        chunk: &'a Chunk,
        question: &str,
        total: usize,
    ) -> (&'a Chunk, Result<String, CompletionError>) {
        tracing::info!(chunk = chunk.index, chunks = total, "Processing chunk");
        let prompt = answer_prompt(&chunk.text, question);
        (chunk, self.completion.complete(SYSTEM_MESSAGE, &prompt).await)
    }

    /// Chunk size left after reserving the system message and the empty extraction template.
    fn chunk_budget(&self) -> Result<usize, ChunkingError> {
        self.settings.budget.usable_for(
            self.tokenizer.as_ref(),
            &[SYSTEM_MESSAGE, &extraction_prompt("", None)],
        )
    }

    async fn load(&self, document_key: &str) -> Result<Arc<str>, DigestError> {
        self.store
            .get_text(document_key)
            .await
            .map_err(|error| match error {
                StoreError::NotFound(key) => DigestError::DocumentNotFound(key),
                other => DigestError::Pipeline(other.to_string()),
            })
    }
}

#[async_trait]
impl DigestApi for DigestService {
    async fn summarize(&self, document_key: &str) -> Result<DigestOutcome, DigestError> {
        tracing::info!(document = document_key, "Summarizing document");
        let text = self.load(document_key).await?;
        self.summarize_text(&text).await
    }

    async fn answer(
        &self,
        document_key: &str,
        question: &str,
    ) -> Result<DigestOutcome, DigestError> {
        if question.trim().is_empty() {
            return Err(DigestError::InvalidQuestion);
        }
        tracing::info!(document = document_key, "Answering question about document");
        let text = self.load(document_key).await?;
        self.answer_text(question, &text).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
