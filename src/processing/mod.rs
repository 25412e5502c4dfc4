//! Digest pipelines: budgeting, chunking, prompting, outline merging, and orchestration.

pub mod budget;
pub mod chunking;
pub mod outline;
pub mod prompts;
mod service;
pub mod types;

pub use budget::TokenBudget;
pub use outline::{DocumentStructure, HeadingTrail, OutlineMerger, Section};
pub use service::{DigestApi, DigestService, PipelineSettings};
pub use types::{Chunk, ChunkingError, DigestError, DigestOutcome};
