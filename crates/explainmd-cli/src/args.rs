use clap::{Parser, Subcommand};

/// Exit codes shared by every evaluator: 0 success, 1 internal error,
/// 2 threshold or baseline mismatch.
pub const EXIT_OK: i32 = 0;
pub const EXIT_MISMATCH: i32 = 2;

#[derive(Parser, Debug, Clone)]
#[command(name = "explainmd", version, about = "explainmd evaluator CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Canonicalize declaration exports into an ingestion record.
    Ingest {
        /// Declaration JSON files or directories (repeatable).
        #[arg(long = "include", required = true)]
        include: Vec<String>,

        /// Write the ingestion record here.
        #[arg(long)]
        out: Option<String>,

        /// Drop unknown dependency targets instead of keeping them as
        /// external graph nodes.
        #[arg(long)]
        drop_external: bool,
    },

    /// Build a tree with the offline summarizer and score it.
    QualityHarness {
        /// Ingestion record produced by `ingest`.
        #[arg(long = "include", required = true)]
        include: String,

        #[arg(long)]
        out: Option<String>,

        /// Baseline report to compare against.
        #[arg(long)]
        baseline: Option<String>,

        /// Write (or overwrite) the baseline instead of comparing.
        #[arg(long)]
        write_baseline: bool,

        /// Minimum mean vocabulary coverage across parents.
        #[arg(long, default_value_t = 0.62)]
        min_vocabulary_coverage: f64,

        /// Maximum tolerated repartition events.
        #[arg(long, default_value_t = 0)]
        max_repartitions: usize,
    },

    /// Run the deterministic release gates.
    ReleaseGate {
        #[arg(long)]
        out: Option<String>,
    },

    /// Exercise the sanitizer and critique over adversarial samples.
    SummarySecurity {
        /// Extra sample files, one sample per line (repeatable).
        #[arg(long = "include")]
        include: Vec<String>,

        #[arg(long)]
        out: Option<String>,

        /// The filter contract is non-empty: the builtin corpus must yield
        /// at least this many redactions.
        #[arg(long, default_value_t = 4)]
        min_redactions: usize,
    },

    /// Produce a corpus dossier from an ingestion record.
    ResearchDossier {
        #[arg(long = "include", required = true)]
        include: String,

        #[arg(long)]
        out: Option<String>,
    },

    /// One tiny round-trip through the live model provider.
    LiveProviderCheck {
        /// Override the configured endpoint.
        #[arg(long)]
        endpoint: Option<String>,

        /// Override the configured model.
        #[arg(long)]
        model: Option<String>,
    },
}
