use anyhow::Result;

use crate::args::{Cli, Command};

mod ingest;
mod live_check;
mod quality;
mod release_gate;
mod research_dossier;
mod summary_security;

/// Dispatch to the evaluator; the returned value is the process exit code
/// (0 success, 2 threshold/baseline mismatch; errors map to 1 in main).
pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Ingest {
            include,
            out,
            drop_external,
        } => ingest::run(&include, out.as_deref(), drop_external).await,
        Command::QualityHarness {
            include,
            out,
            baseline,
            write_baseline,
            min_vocabulary_coverage,
            max_repartitions,
        } => {
            quality::run(
                &include,
                out.as_deref(),
                baseline.as_deref(),
                write_baseline,
                min_vocabulary_coverage,
                max_repartitions,
            )
            .await
        }
        Command::ReleaseGate { out } => release_gate::run(out.as_deref()).await,
        Command::SummarySecurity {
            include,
            out,
            min_redactions,
        } => summary_security::run(&include, out.as_deref(), min_redactions).await,
        Command::ResearchDossier { include, out } => {
            research_dossier::run(&include, out.as_deref()).await
        }
        Command::LiveProviderCheck { endpoint, model } => {
            live_check::run(endpoint.as_deref(), model.as_deref()).await
        }
    }
}
