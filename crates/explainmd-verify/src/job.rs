//! Verification jobs.
//!
//! Lifecycle: created `queued`, transitions `queued -> running ->
//! {success | failure | timeout}`, persisted to the ledger after each
//! transition. Status-dependent invariants are enforced by the collecting
//! validator: `queued` carries no timestamps beyond created/updated,
//! `running` has `startedAt`, terminal statuses have `finishedAt` and a
//! result.

use explainmd_core::determinism::canonical::{CanonicalRender, CanonicalWriter};
use explainmd_core::errors::{ExplainError, ExplainResult, Issue, ValidationOutcome};
use serde::{Deserialize, Serialize};

use crate::contract::{compute_verification_reproducibility_hash, ReproducibilityContract};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Queued,
    Running,
    Success,
    Failure,
    Timeout,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Timeout)
    }
}

/// What is being verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationTarget {
    pub leaf_id: String,
    pub module_path: String,
    pub declaration_name: String,
}

impl VerificationTarget {
    pub fn canonicalize(mut self) -> ExplainResult<Self> {
        self.leaf_id = self.leaf_id.trim().to_string();
        self.module_path = self.module_path.trim().replace('\\', "/");
        self.declaration_name = self.declaration_name.trim().to_string();
        if self.leaf_id.is_empty() {
            return Err(ExplainError::invalid_argument("target leafId is empty"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    System,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogLine {
    pub stream: LogStream,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub exit_code: Option<i64>,
    pub signal: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationJob {
    pub schema_version: String,
    pub job_id: String,
    pub queue_sequence: u64,
    pub status: VerificationStatus,
    pub target: VerificationTarget,
    pub reproducibility: ReproducibilityContract,
    pub timeout_ms: u64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub logs: Vec<JobLogLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// Status-dependent invariants.
pub fn validate_job(job: &VerificationJob) -> ValidationOutcome {
    let mut issues = Vec::new();

    if job.job_id.trim().is_empty() {
        issues.push(Issue::new("job.id.empty", "jobId is empty"));
    }
    if job.timeout_ms == 0 {
        issues.push(Issue::new("job.timeout.zero", "timeoutMs must be positive"));
    }

    match job.status {
        VerificationStatus::Queued => {
            if job.started_at.is_some() || job.finished_at.is_some() || job.result.is_some() {
                issues.push(Issue::new(
                    "job.queued.state",
                    "queued job carries run-state fields",
                ));
            }
        }
        VerificationStatus::Running => {
            if job.started_at.is_none() {
                issues.push(Issue::new("job.running.startedAt", "running job lacks startedAt"));
            }
            if job.finished_at.is_some() || job.result.is_some() {
                issues.push(Issue::new(
                    "job.running.state",
                    "running job carries terminal fields",
                ));
            }
        }
        _ => {
            if job.finished_at.is_none() {
                issues.push(Issue::new(
                    "job.terminal.finishedAt",
                    "terminal job lacks finishedAt",
                ));
            }
            if job.result.is_none() {
                issues.push(Issue::new("job.terminal.result", "terminal job lacks result"));
            }
        }
    }

    ValidationOutcome::from_issues(issues)
}

pub fn assert_valid_job(job: &VerificationJob) -> ExplainResult<()> {
    let outcome = validate_job(job);
    if !outcome.ok {
        return Err(outcome.into_error("verification job"));
    }
    Ok(())
}

impl CanonicalRender for VerificationJob {
    /// Wall-clock fields (`createdAt`, `updatedAt`, `startedAt`,
    /// `finishedAt`) are metadata and never enter the rendering.
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.text_field("jobId", &self.job_id);
        for (i, l) in self.logs.iter().enumerate() {
            w.text_field(&CanonicalWriter::index_key("log", i, "line"), &l.line);
            w.text_field(&CanonicalWriter::index_key("log", i, "stream"), l.stream.as_str());
        }
        w.field("queueSequence", self.queue_sequence);
        w.text_field(
            "reproducibilityHash",
            &compute_verification_reproducibility_hash(&self.reproducibility),
        );
        match &self.result {
            Some(r) => {
                w.field("result.durationMs", r.duration_ms);
                w.opt_field("result.exitCode", r.exit_code);
                w.opt_text_field("result.signal", r.signal.as_deref());
            }
            None => w.opt_text_field("result", None),
        }
        w.text_field("schemaVersion", &self.schema_version);
        w.text_field("status", self.status.as_str());
        w.text_field("target.declarationName", &self.target.declaration_name);
        w.text_field("target.leafId", &self.target.leaf_id);
        w.text_field("target.modulePath", &self.target.module_path);
        w.field("timeoutMs", self.timeout_ms);
        w.finish()
    }
}

/// Canonical hash of one job.
pub fn compute_verification_job_hash(job: &VerificationJob) -> String {
    job.canonical_hash_hex()
}
