//! explainmd-llm
//!
//! The summarizer side of explainmd:
//! - deterministic prompt assembly with sanitization sentinels
//! - output parsing (raw JSON or fenced block) with collected schema issues
//! - critique scanning for secret/injection leakage
//! - the pipeline summarizer implementing the core port, with one
//!   tightened-prompt retry
//! - a deterministic offline summarizer for evaluators and tests
//! - the live HTTP provider (OpenAI-style chat endpoint) with SSE streaming
//!   and a deterministic retry schedule

pub mod offline;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod stream;

pub use crate::offline::OfflineSummarizer;
pub use crate::pipeline::PipelineSummarizer;
pub use crate::provider::{
    ChatMessage, GenerateRequest, GenerateResponse, HttpSummaryProvider, ProviderError,
    SummaryProvider,
};
