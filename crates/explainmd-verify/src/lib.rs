//! explainmd-verify
//!
//! The verification workflow:
//! - a queued, sequentially-numbered job ledger around an external
//!   proof-checker
//! - reproducibility contracts (the bit-exact tuple that makes a run
//!   replayable) with canonical hashes
//! - a child-process runner implementation with timeout and stream capture
//! - ledger persistence with sequence resumption
//!
//! Timestamps on jobs are metadata: they come from an injected clock and
//! never enter a canonical hash.

pub mod clock;
pub mod contract;
pub mod job;
pub mod ledger;
pub mod runner;
pub mod workflow;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::contract::{
    compute_verification_reproducibility_hash, replay_command, ReproducibilityContract, Toolchain,
};
pub use crate::job::{
    compute_verification_job_hash, JobLogLine, JobResult, LogStream, VerificationJob,
    VerificationStatus, VerificationTarget,
};
pub use crate::ledger::{read_verification_ledger, write_verification_ledger, VerificationLedger};
pub use crate::runner::{ChildProcessRunner, RunnerError, RunnerOptions, RunnerOutcome, VerificationRunner};
pub use crate::workflow::{EnqueueOptions, VerificationWorkflow, WorkflowError};
