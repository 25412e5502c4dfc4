#![deny(missing_docs)]

//! Core library for Rusty Digest: grounded outlines and answers from long documents.

/// Chat-completion client abstraction, provider adapters, and retries.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline activity counters.
pub mod metrics;
/// Outline and question pipelines.
pub mod processing;
/// Document text storage and extraction.
pub mod store;
/// Model tokenizer adapter.
pub mod tokenizer;
