use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use explainmd_api::{build_router, ApiState};
use explainmd_verify::{
    read_verification_ledger, ChildProcessRunner, RunnerOptions, SystemClock,
    VerificationWorkflow,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("EXPLAIN_MD_API_BIND").unwrap_or_else(|_| "127.0.0.1:8787".into());
    let ledger_path = std::env::var("EXPLAIN_MD_LEDGER_PATH").ok().map(PathBuf::from);

    // Resume from an existing ledger when one is configured and present.
    let workflow = match &ledger_path {
        Some(path) if path.exists() => {
            let ledger = read_verification_ledger(path)?;
            info!(jobs = ledger.jobs.len(), "resuming verification ledger");
            VerificationWorkflow::from_ledger(ledger, Box::new(SystemClock))?
        }
        _ => VerificationWorkflow::new(),
    };

    let state = Arc::new(ApiState {
        workflow: Mutex::new(workflow),
        runner: Arc::new(ChildProcessRunner::new(RunnerOptions {
            inherit_env: true,
            additional_env: Default::default(),
        })),
        ledger_path,
    });

    let app = build_router(state);
    let addr: SocketAddr = bind.parse()?;
    info!("explainmd verification API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
