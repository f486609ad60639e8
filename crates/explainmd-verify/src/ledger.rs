//! Ledger persistence.
//!
//! JSON with stable key order (`schemaVersion` first) and a trailing
//! newline. Reads re-validate every job and re-sort by queue sequence, so
//! `read(write(ledger)) == canonicalize(ledger)`.

use std::path::Path;

use explainmd_core::determinism::canonical::{CanonicalRender, CanonicalWriter};
use explainmd_core::errors::{ExplainError, ExplainResult};
use explainmd_core::version::VERIFICATION_LEDGER_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

use crate::job::{assert_valid_job, compute_verification_job_hash, VerificationJob};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLedger {
    pub schema_version: String,
    pub jobs: Vec<VerificationJob>,
}

impl VerificationLedger {
    pub fn canonicalize(mut self) -> ExplainResult<Self> {
        if self.schema_version != VERIFICATION_LEDGER_SCHEMA_VERSION {
            return Err(ExplainError::invalid_argument(format!(
                "unsupported ledger schema version: {}",
                self.schema_version
            )));
        }
        for job in &self.jobs {
            assert_valid_job(job)?;
        }
        self.jobs.sort_by_key(|j| j.queue_sequence);
        for w in self.jobs.windows(2) {
            if w[0].queue_sequence == w[1].queue_sequence {
                return Err(ExplainError::invalid_argument(format!(
                    "ledger contains duplicate queue sequence {}",
                    w[0].queue_sequence
                )));
            }
        }
        Ok(self)
    }

    pub fn to_json_string(&self) -> ExplainResult<String> {
        let mut s = serde_json::to_string_pretty(self)
            .map_err(|e| ExplainError::serialization(format!("ledger encode failed: {e}")))?;
        s.push('\n');
        Ok(s)
    }

    pub fn from_json_str(s: &str) -> ExplainResult<Self> {
        let ledger: VerificationLedger = serde_json::from_str(s)
            .map_err(|e| ExplainError::serialization(format!("ledger decode failed: {e}")))?;
        ledger.canonicalize()
    }
}

impl CanonicalRender for VerificationLedger {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.field("jobCount", self.jobs.len());
        w.text_field("schemaVersion", &self.schema_version);
        for job in &self.jobs {
            // Keyed by job id: input order cannot influence the rendering.
            w.text_field(
                &format!("job.{}.hash", job.job_id),
                &compute_verification_job_hash(job),
            );
        }
        w.finish()
    }
}

/// Write the canonical JSON form to `path` (full-file rewrite).
pub fn write_verification_ledger(path: &Path, ledger: &VerificationLedger) -> ExplainResult<()> {
    let canonical = ledger.clone().canonicalize()?;
    std::fs::write(path, canonical.to_json_string()?)
        .map_err(|e| ExplainError::serialization(format!("ledger write failed: {e}")))
}

/// Load and canonicalize a ledger file.
pub fn read_verification_ledger(path: &Path) -> ExplainResult<VerificationLedger> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| ExplainError::serialization(format!("ledger read failed: {e}")))?;
    VerificationLedger::from_json_str(&s)
}
