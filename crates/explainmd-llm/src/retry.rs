//! Deterministic retry schedule for the summarizer transport.
//!
//! Up to `maxRetries` attempts; backoff is `retryBaseDelayMs * 2^(attempt-1)`
//! and only `transient` and `timeout` classifications are retried.

use explainmd_core::config::ModelProviderConfig;
use tracing::warn;

use crate::provider::{GenerateRequest, GenerateResponse, ProviderError, SummaryProvider};

/// A transport failure plus the attempt counter for forensics.
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct ProviderFailure {
    pub error: ProviderError,
    pub attempts: u32,
}

/// Backoff before the given retry attempt (attempt numbering starts at 1).
pub fn backoff_delay_ms(base_delay_ms: u64, attempt: u32) -> u64 {
    base_delay_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16))
}

pub async fn generate_with_retry<P: SummaryProvider + ?Sized>(
    provider: &P,
    request: &GenerateRequest,
    cfg: &ModelProviderConfig,
) -> Result<GenerateResponse, ProviderFailure> {
    let max_attempts = cfg.max_retries.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match provider.generate(request).await {
            Ok(response) => return Ok(response),
            Err(error) => {
                let retryable = error.code().is_retryable();
                if !retryable || attempt >= max_attempts {
                    return Err(ProviderFailure {
                        error,
                        attempts: attempt,
                    });
                }
                let delay = backoff_delay_ms(cfg.retry_base_delay_ms, attempt);
                warn!(attempt, delay_ms = delay, "retrying summary provider: {error}");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
    }
}
