use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_summarized: AtomicU64,
    questions_answered: AtomicU64,
    chunks_processed: AtomicU64,
    chunks_failed: AtomicU64,
    last_chunk_size: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed outline run.
    pub fn record_summary(&self, chunk_count: u64, failed: u64, chunk_size: u64) {
        self.documents_summarized.fetch_add(1, Ordering::Relaxed);
        self.record_chunks(chunk_count, failed, chunk_size);
    }

    /// Record a completed question run.
    pub fn record_answer(&self, chunk_count: u64, failed: u64, chunk_size: u64) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        self.record_chunks(chunk_count, failed, chunk_size);
    }

    fn record_chunks(&self, chunk_count: u64, failed: u64, chunk_size: u64) {
        self.chunks_processed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.chunks_failed.fetch_add(failed, Ordering::Relaxed);
        self.last_chunk_size.store(chunk_size, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_summarized: self.documents_summarized.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            last_chunk_size: self.last_chunk_size.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Outline runs completed since startup.
    pub documents_summarized: u64,
    /// Question runs completed since startup.
    pub questions_answered: u64,
    /// Chunks sent to the model across all runs.
    pub chunks_processed: u64,
    /// Chunks whose completion call failed.
    pub chunks_failed: u64,
    /// Chunk token budget used by the most recent run.
    pub last_chunk_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_runs_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_summary(3, 1, 14000);
        metrics.record_answer(2, 0, 13990);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_summarized, 1);
        assert_eq!(snapshot.questions_answered, 1);
        assert_eq!(snapshot.chunks_processed, 5);
        assert_eq!(snapshot.chunks_failed, 1);
        assert_eq!(snapshot.last_chunk_size, 13990);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(PipelineMetrics::new().snapshot()).expect("json");
        assert_eq!(json["documentsSummarized"], 0);
        assert_eq!(json["lastChunkSize"], 0);
    }
}
