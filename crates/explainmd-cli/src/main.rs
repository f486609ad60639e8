use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod cmd;
mod io;
mod output;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = args::Cli::parse();
    match cmd::dispatch(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::eprintln_line(&format!("error: {e:#}"));
            std::process::exit(1);
        }
    }
}
