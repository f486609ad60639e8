//! The verification workflow.
//!
//! One instance owns an in-memory job map keyed by `jobId` and a monotone
//! `nextSequence` (1-based). Concurrent writers are not supported; callers
//! serialize access. Persistence is a full-file ledger rewrite under the
//! caller's write discipline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use explainmd_core::errors::ExplainError;
use explainmd_core::version::VERIFICATION_LEDGER_SCHEMA_VERSION;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::contract::ReproducibilityContract;
use crate::job::{
    assert_valid_job, JobLogLine, JobResult, LogStream, VerificationJob, VerificationStatus,
    VerificationTarget,
};
use crate::ledger::VerificationLedger;
use crate::runner::VerificationRunner;

/// Merged stdout/stderr lines kept per job before truncation.
pub const MAX_LOG_LINES_PER_JOB: usize = 500;

pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Core(#[from] ExplainError),

    #[error("duplicate job id: {0}")]
    DuplicateJob(String),

    #[error("unknown job id: {0}")]
    UnknownJob(String),

    #[error("job {job_id} is not queued (status {status})")]
    Conflict { job_id: String, status: String },
}

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Caller-supplied id; the default factory mints `job-%06d` from the
    /// queue sequence.
    pub job_id: Option<String>,
    pub timeout_ms: Option<u64>,
}

pub struct VerificationWorkflow {
    jobs: BTreeMap<String, VerificationJob>,
    next_sequence: u64,
    clock: Box<dyn Clock>,
    base_dir: PathBuf,
}

impl VerificationWorkflow {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_sequence: 1,
            clock,
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// Base directory used to absolutize relative contract paths.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Mint a new queued job. The target and contract are canonicalized,
    /// the next sequence number is assigned, duplicate ids are rejected.
    pub fn enqueue(
        &mut self,
        target: VerificationTarget,
        reproducibility: ReproducibilityContract,
        options: EnqueueOptions,
    ) -> Result<VerificationJob, WorkflowError> {
        let target = target.canonicalize()?;
        let reproducibility = reproducibility.canonicalize(&self.base_dir)?;

        let sequence = self.next_sequence;
        let job_id = options
            .job_id
            .unwrap_or_else(|| format!("job-{sequence:06}"));
        if self.jobs.contains_key(&job_id) {
            return Err(WorkflowError::DuplicateJob(job_id));
        }

        let now = self.clock.now_iso8601();
        let job = VerificationJob {
            schema_version: VERIFICATION_LEDGER_SCHEMA_VERSION.to_string(),
            job_id: job_id.clone(),
            queue_sequence: sequence,
            status: VerificationStatus::Queued,
            target,
            reproducibility,
            timeout_ms: options.timeout_ms.unwrap_or(DEFAULT_JOB_TIMEOUT_MS),
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            finished_at: None,
            logs: vec![],
            result: None,
        };
        assert_valid_job(&job)?;

        self.next_sequence += 1;
        self.jobs.insert(job_id.clone(), job.clone());
        info!(job_id = %job_id, sequence, "verification job enqueued");
        Ok(job)
    }

    /// Transition `queued -> running -> terminal`, invoking the runner.
    /// Runner exceptions downgrade to `failure` with a single system log
    /// line; they never propagate.
    pub async fn run_job(
        &mut self,
        job_id: &str,
        runner: &dyn VerificationRunner,
    ) -> Result<VerificationJob, WorkflowError> {
        let (contract, timeout_ms) = {
            let job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| WorkflowError::UnknownJob(job_id.to_string()))?;
            if job.status != VerificationStatus::Queued {
                return Err(WorkflowError::Conflict {
                    job_id: job_id.to_string(),
                    status: job.status.as_str().to_string(),
                });
            }
            let now = self.clock.now_iso8601();
            job.status = VerificationStatus::Running;
            job.started_at = Some(now.clone());
            job.updated_at = now;
            (job.reproducibility.clone(), job.timeout_ms)
        };

        let run = runner.run(&contract, timeout_ms).await;

        let job = self.jobs.get_mut(job_id).expect("job present while running");
        let now = self.clock.now_iso8601();
        match run {
            Ok(outcome) => {
                job.status = if outcome.timed_out {
                    VerificationStatus::Timeout
                } else if outcome.exit_code == Some(0) {
                    VerificationStatus::Success
                } else {
                    VerificationStatus::Failure
                };
                job.logs = collect_logs(&outcome.stdout, &outcome.stderr);
                job.result = Some(JobResult {
                    exit_code: outcome.exit_code,
                    signal: outcome.signal,
                    duration_ms: outcome.duration_ms,
                });
            }
            Err(err) => {
                job.status = VerificationStatus::Failure;
                job.logs = vec![JobLogLine {
                    stream: LogStream::System,
                    line: err.to_string(),
                }];
                job.result = Some(JobResult {
                    exit_code: None,
                    signal: None,
                    duration_ms: 0,
                });
            }
        }
        job.finished_at = Some(now.clone());
        job.updated_at = now;
        assert_valid_job(job)?;
        info!(job_id = %job_id, status = job.status.as_str(), "verification job finished");
        Ok(job.clone())
    }

    /// Run the earliest-queued job, or return `None`.
    pub async fn run_next_queued_job(
        &mut self,
        runner: &dyn VerificationRunner,
    ) -> Result<Option<VerificationJob>, WorkflowError> {
        let next = self
            .jobs
            .values()
            .filter(|j| j.status == VerificationStatus::Queued)
            .min_by_key(|j| j.queue_sequence)
            .map(|j| j.job_id.clone());
        match next {
            Some(id) => Ok(Some(self.run_job(&id, runner).await?)),
            None => Ok(None),
        }
    }

    /// Jobs ordered by queue sequence, as defensive copies.
    pub fn list_jobs(&self) -> Vec<VerificationJob> {
        let mut jobs: Vec<VerificationJob> = self.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.queue_sequence);
        jobs
    }

    pub fn list_jobs_for_leaf(&self, leaf_id: &str) -> Vec<VerificationJob> {
        self.list_jobs()
            .into_iter()
            .filter(|j| j.target.leaf_id == leaf_id)
            .collect()
    }

    pub fn get_job(&self, job_id: &str) -> Option<VerificationJob> {
        self.jobs.get(job_id).cloned()
    }

    /// Snapshot the workflow as a persistable ledger.
    pub fn to_ledger(&self) -> VerificationLedger {
        VerificationLedger {
            schema_version: VERIFICATION_LEDGER_SCHEMA_VERSION.to_string(),
            jobs: self.list_jobs(),
        }
    }

    /// Rebuild a workflow from a loaded ledger;
    /// `nextSequence = 1 + max(queueSequence)`.
    pub fn from_ledger(
        ledger: VerificationLedger,
        clock: Box<dyn Clock>,
    ) -> Result<Self, WorkflowError> {
        let mut jobs = BTreeMap::new();
        let mut max_sequence = 0u64;
        for job in ledger.jobs {
            assert_valid_job(&job)?;
            max_sequence = max_sequence.max(job.queue_sequence);
            if jobs.insert(job.job_id.clone(), job).is_some() {
                return Err(WorkflowError::Core(ExplainError::invalid_argument(
                    "ledger contains duplicate job ids",
                )));
            }
        }
        Ok(Self {
            jobs,
            next_sequence: max_sequence + 1,
            clock,
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        })
    }
}

impl Default for VerificationWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge the two streams into tagged lines with the per-job cap; when
/// capped, the final synthetic line records how many were dropped.
fn collect_logs(stdout: &str, stderr: &str) -> Vec<JobLogLine> {
    let mut lines: Vec<JobLogLine> = Vec::new();
    for line in stdout.lines() {
        lines.push(JobLogLine {
            stream: LogStream::Stdout,
            line: line.to_string(),
        });
    }
    for line in stderr.lines() {
        lines.push(JobLogLine {
            stream: LogStream::Stderr,
            line: line.to_string(),
        });
    }
    if lines.len() > MAX_LOG_LINES_PER_JOB {
        let truncated = lines.len() - MAX_LOG_LINES_PER_JOB;
        lines.truncate(MAX_LOG_LINES_PER_JOB);
        lines.push(JobLogLine {
            stream: LogStream::System,
            line: format!("Truncated {truncated} log lines."),
        });
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::contract::tests::sample_contract;
    use crate::runner::{RunnerError, RunnerOutcome};
    use async_trait::async_trait;

    fn target(leaf: &str) -> VerificationTarget {
        VerificationTarget {
            leaf_id: leaf.to_string(),
            module_path: "M".to_string(),
            declaration_name: "thm".to_string(),
        }
    }

    fn workflow() -> VerificationWorkflow {
        VerificationWorkflow::with_clock(Box::new(FixedClock(
            "2026-01-01T00:00:00Z".to_string(),
        )))
        .with_base_dir("/work")
    }

    struct ScriptedRunner(Result<RunnerOutcome, &'static str>);

    #[async_trait]
    impl VerificationRunner for ScriptedRunner {
        async fn run(
            &self,
            _contract: &ReproducibilityContract,
            _timeout_ms: u64,
        ) -> Result<RunnerOutcome, RunnerError> {
            self.0.clone().map_err(|e| RunnerError(e.to_string()))
        }
    }

    fn ok_outcome(exit_code: i64) -> RunnerOutcome {
        RunnerOutcome {
            exit_code: Some(exit_code),
            signal: None,
            duration_ms: 42,
            timed_out: false,
            stdout: "checked\n".to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn sequences_are_consecutive() {
        let mut wf = workflow();
        let a = wf
            .enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let b = wf
            .enqueue(target("l2"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        assert_eq!(a.queue_sequence, 1);
        assert_eq!(b.queue_sequence, 2);
        assert_eq!(a.job_id, "job-000001");
        assert_eq!(b.job_id, "job-000002");
    }

    #[test]
    fn duplicate_job_ids_rejected() {
        let mut wf = workflow();
        let opts = EnqueueOptions {
            job_id: Some("custom".to_string()),
            timeout_ms: None,
        };
        wf.enqueue(target("l1"), sample_contract(), opts.clone())
            .unwrap();
        let err = wf.enqueue(target("l2"), sample_contract(), opts).err().unwrap();
        assert!(matches!(err, WorkflowError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn run_job_success_path() {
        let mut wf = workflow();
        let job = wf
            .enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let done = wf
            .run_job(&job.job_id, &ScriptedRunner(Ok(ok_outcome(0))))
            .await
            .unwrap();
        assert_eq!(done.status, VerificationStatus::Success);
        assert_eq!(done.result.as_ref().unwrap().exit_code, Some(0));
        assert_eq!(done.logs.len(), 1);
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let mut wf = workflow();
        let job = wf
            .enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let done = wf
            .run_job(&job.job_id, &ScriptedRunner(Ok(ok_outcome(2))))
            .await
            .unwrap();
        assert_eq!(done.status, VerificationStatus::Failure);
    }

    #[tokio::test]
    async fn timeout_classification() {
        let mut wf = workflow();
        let job = wf
            .enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let outcome = RunnerOutcome {
            exit_code: None,
            signal: Some("SIGKILL".to_string()),
            duration_ms: 5_000,
            timed_out: true,
            stdout: String::new(),
            stderr: String::new(),
        };
        let done = wf
            .run_job(&job.job_id, &ScriptedRunner(Ok(outcome)))
            .await
            .unwrap();
        assert_eq!(done.status, VerificationStatus::Timeout);
        assert_eq!(done.result.as_ref().unwrap().duration_ms, 5_000);
    }

    #[tokio::test]
    async fn runner_exception_downgrades_to_failure() {
        let mut wf = workflow();
        let job = wf
            .enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let done = wf
            .run_job(&job.job_id, &ScriptedRunner(Err("spawn failed")))
            .await
            .unwrap();
        assert_eq!(done.status, VerificationStatus::Failure);
        let result = done.result.as_ref().unwrap();
        assert_eq!(result.exit_code, None);
        assert_eq!(result.signal, None);
        assert_eq!(result.duration_ms, 0);
        assert_eq!(done.logs.len(), 1);
        assert_eq!(done.logs[0].stream, LogStream::System);
    }

    #[tokio::test]
    async fn rerun_conflicts() {
        let mut wf = workflow();
        let job = wf
            .enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        wf.run_job(&job.job_id, &ScriptedRunner(Ok(ok_outcome(0))))
            .await
            .unwrap();
        let err = wf
            .run_job(&job.job_id, &ScriptedRunner(Ok(ok_outcome(0))))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WorkflowError::Conflict { .. }));
    }

    #[tokio::test]
    async fn run_next_picks_earliest_queued() {
        let mut wf = workflow();
        let first = wf
            .enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        wf.enqueue(target("l2"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let done = wf
            .run_next_queued_job(&ScriptedRunner(Ok(ok_outcome(0))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.job_id, first.job_id);

        wf.run_next_queued_job(&ScriptedRunner(Ok(ok_outcome(0))))
            .await
            .unwrap()
            .unwrap();
        let none = wf
            .run_next_queued_job(&ScriptedRunner(Ok(ok_outcome(0))))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn listings_are_copies() {
        let mut wf = workflow();
        wf.enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let mut listed = wf.list_jobs();
        listed[0].job_id = "mutated".to_string();
        assert_eq!(wf.list_jobs()[0].job_id, "job-000001");
        assert_eq!(wf.list_jobs_for_leaf("l1").len(), 1);
        assert_eq!(wf.list_jobs_for_leaf("other").len(), 0);
    }

    #[test]
    fn log_cap_appends_truncation_marker() {
        let stdout: String = (0..600).map(|i| format!("line {i}\n")).collect();
        let logs = collect_logs(&stdout, "");
        assert_eq!(logs.len(), MAX_LOG_LINES_PER_JOB + 1);
        let last = logs.last().unwrap();
        assert_eq!(last.stream, LogStream::System);
        assert_eq!(last.line, "Truncated 100 log lines.");
    }

    #[test]
    fn ledger_round_trip_resumes_sequence() {
        let mut wf = workflow();
        wf.enqueue(target("l1"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        let ledger = wf.to_ledger();
        let mut resumed = VerificationWorkflow::from_ledger(
            ledger,
            Box::new(FixedClock("2026-01-02T00:00:00Z".to_string())),
        )
        .unwrap();
        assert_eq!(resumed.next_sequence(), 2);
        let second = resumed
            .enqueue(target("l2"), sample_contract(), EnqueueOptions::default())
            .unwrap();
        assert_eq!(second.job_id, "job-000002");
        assert_eq!(second.queue_sequence, 2);
    }
}
