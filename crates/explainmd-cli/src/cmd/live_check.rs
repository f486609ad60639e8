//! `explainmd live-provider-check` — one tiny round-trip through the
//! configured model provider.
//!
//! Exit 0 when the provider answers, 2 when it is reachable-but-failing or
//! misconfigured (missing key, timeout, HTTP error), 1 on internal errors.

use anyhow::Result;
use serde::Serialize;

use explainmd_core::config::ExplainConfig;
use explainmd_llm::retry::generate_with_retry;
use explainmd_llm::{ChatMessage, GenerateRequest, HttpSummaryProvider};

use crate::args::{EXIT_MISMATCH, EXIT_OK};
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveCheckReport {
    ok: bool,
    endpoint: String,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run(endpoint: Option<&str>, model: Option<&str>) -> Result<i32> {
    let mut cfg = ExplainConfig::default();
    if let Some(e) = endpoint {
        cfg.model_provider.endpoint = e.to_string();
    }
    if let Some(m) = model {
        cfg.model_provider.model = m.to_string();
    }
    let cfg = cfg.normalize();
    cfg.validate()?;

    let mut report = LiveCheckReport {
        ok: false,
        endpoint: cfg.model_provider.endpoint.clone(),
        model: cfg.model_provider.model.clone(),
        finish_reason: None,
        response_chars: None,
        error: None,
    };

    let provider = match HttpSummaryProvider::from_env(&cfg.model_provider) {
        Ok(p) => p,
        Err(e) => {
            report.error = Some(e.to_string());
            output::print(&report)?;
            return Ok(EXIT_MISMATCH);
        }
    };

    let request = GenerateRequest {
        messages: vec![
            ChatMessage::system("You are a connectivity probe. Answer tersely."),
            ChatMessage::user("Reply with the single word: ready"),
        ],
        model: cfg.model_provider.model.clone(),
        temperature: 0.0,
        max_output_tokens: 8,
    };

    match generate_with_retry(&provider, &request, &cfg.model_provider).await {
        Ok(response) => {
            report.ok = !response.text.trim().is_empty();
            report.finish_reason = Some(format!("{:?}", response.finish_reason));
            report.response_chars = Some(response.text.len());
            output::print(&report)?;
            Ok(if report.ok { EXIT_OK } else { EXIT_MISMATCH })
        }
        Err(failure) => {
            report.error = Some(failure.to_string());
            output::print(&report)?;
            Ok(EXIT_MISMATCH)
        }
    }
}
